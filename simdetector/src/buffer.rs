/*!
Raw buffer lifecycle and output frame handoff.

The raw buffer is scratch space owned by the detector: it is sized for the full
maximum geometry, keeps its content between frames so the synthesizer can
accumulate, and only ever grows. Output frames are immutable and shared; the
manager holds exactly one of them as the current frame.
*/

use shared::frame::ArcFrame;
use shared::{FrameLease, FramePool, ImageFrame, Result, SimError};
use std::sync::Arc;
use tracing::debug;

pub struct BufferManager {
    raw: Vec<u8>,
    pool: FramePool,
    current: Option<ArcFrame>,
}

impl BufferManager {
    /// Create a manager with an empty raw buffer
    pub fn new(pool: FramePool) -> Self {
        Self {
            raw: Vec::new(),
            pool,
            current: None,
        }
    }

    /// Grow the raw buffer to at least `required_bytes`; never shrinks
    pub fn ensure_capacity(&mut self, required_bytes: usize) -> Result<()> {
        let current = self.raw.len();
        if required_bytes <= current {
            return Ok(());
        }

        self.raw
            .try_reserve_exact(required_bytes - current)
            .map_err(|e| {
                SimError::allocation(format!(
                    "cannot grow raw buffer from {} to {} bytes: {}",
                    current, required_bytes, e
                ))
            })?;
        self.raw.resize(required_bytes, 0);

        debug!("Raw buffer grown from {} to {} bytes", current, required_bytes);
        Ok(())
    }

    /// Current raw buffer size in bytes
    pub fn raw_capacity(&self) -> usize {
        self.raw.len()
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.raw
    }

    /// Pool that output frames are leased from
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// Lease room for the next output frame.
    ///
    /// The current frame is replaced on publish, so its lease counts as free
    /// unless a consumer still holds the frame.
    pub fn lease_next(&self, bytes: usize) -> Result<FrameLease> {
        let replaced = self
            .current
            .as_ref()
            .filter(|frame| Arc::strong_count(frame) == 1)
            .and_then(|frame| frame.lease());
        self.pool.allocate_replacing(bytes, replaced)
    }

    /// Make `frame` the current frame, releasing the previous one. Consumers
    /// holding their own reference to the previous frame keep it alive.
    pub fn publish(&mut self, frame: ImageFrame) -> ArcFrame {
        let frame = Arc::new(frame);
        self.current = Some(Arc::clone(&frame));
        frame
    }

    pub fn current(&self) -> Option<&ArcFrame> {
        self.current.as_ref()
    }
}
