/*!
Bounded accounting of live output frames.

Output frames are shared by reference counting, so the pool does not own their
memory. Each frame instead carries a [`FrameLease`] that counts against the
pool's limits until the last reference to the frame is dropped.
*/

use crate::error::{Result, SimError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct PoolUsage {
    frames: AtomicUsize,
    bytes: AtomicUsize,
}

/// Limits on the number and total size of frames alive at once
#[derive(Debug, Clone)]
pub struct FramePool {
    max_buffers: usize,
    max_memory: usize,
    usage: Arc<PoolUsage>,
}

impl FramePool {
    /// Create a pool; a limit of 0 means unlimited
    pub fn new(max_buffers: usize, max_memory: usize) -> Self {
        Self {
            max_buffers,
            max_memory,
            usage: Arc::new(PoolUsage::default()),
        }
    }

    /// Reserve room for one frame of `bytes` bytes
    pub fn allocate(&self, bytes: usize) -> Result<FrameLease> {
        self.allocate_replacing(bytes, None)
    }

    /// Reserve room for one frame that replaces a frame holding `replaced`.
    ///
    /// The replaced lease is counted as already released when checking the
    /// limits, so a frame can be swapped for a new one at a limit of 1.
    pub fn allocate_replacing(&self, bytes: usize, replaced: Option<&FrameLease>) -> Result<FrameLease> {
        let frames = self.usage.frames.fetch_add(1, Ordering::AcqRel) + 1;
        let total = self.usage.bytes.fetch_add(bytes, Ordering::AcqRel) + bytes;

        // The lease releases both counters if a limit was exceeded.
        let lease = FrameLease {
            usage: Arc::clone(&self.usage),
            bytes,
        };

        let (frames, total) = match replaced {
            Some(old) => (frames.saturating_sub(1), total.saturating_sub(old.bytes)),
            None => (frames, total),
        };

        if self.max_buffers > 0 && frames > self.max_buffers {
            return Err(SimError::allocation(format!(
                "frame pool exhausted: {} of {} buffers in use",
                frames - 1,
                self.max_buffers
            )));
        }
        if self.max_memory > 0 && total > self.max_memory {
            return Err(SimError::allocation(format!(
                "frame pool memory exceeded: {} bytes requested, {} of {} in use",
                bytes,
                total - bytes,
                self.max_memory
            )));
        }

        debug!("Allocated frame lease ({} bytes, {} frames live)", bytes, frames);
        Ok(lease)
    }

    /// Number of frames currently alive
    pub fn live_frames(&self) -> usize {
        self.usage.frames.load(Ordering::Acquire)
    }

    /// Bytes held by frames currently alive
    pub fn live_bytes(&self) -> usize {
        self.usage.bytes.load(Ordering::Acquire)
    }

}

/// Claim on pool capacity held by one frame
#[derive(Debug)]
pub struct FrameLease {
    usage: Arc<PoolUsage>,
    bytes: usize,
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.usage.frames.fetch_sub(1, Ordering::AcqRel);
        self.usage.bytes.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_pool() {
        let pool = FramePool::new(0, 0);
        let leases: Vec<_> = (0..100).map(|_| pool.allocate(1 << 20).unwrap()).collect();
        assert_eq!(pool.live_frames(), 100);
        drop(leases);
        assert_eq!(pool.live_frames(), 0);
        assert_eq!(pool.live_bytes(), 0);
    }

    #[test]
    fn test_buffer_limit() {
        let pool = FramePool::new(2, 0);
        let first = pool.allocate(10).unwrap();
        let _second = pool.allocate(10).unwrap();

        let err = pool.allocate(10).unwrap_err();
        assert!(err.is_allocation());
        // A failed allocation leaves nothing behind
        assert_eq!(pool.live_frames(), 2);
        assert_eq!(pool.live_bytes(), 20);

        drop(first);
        assert!(pool.allocate(10).is_ok());
    }

    #[test]
    fn test_memory_limit() {
        let pool = FramePool::new(0, 100);
        let _held = pool.allocate(60).unwrap();
        assert!(pool.allocate(41).unwrap_err().is_allocation());
        assert!(pool.allocate(40).is_ok());
    }

    #[test]
    fn test_replacement_counts_old_lease_as_freed() {
        let pool = FramePool::new(1, 100);
        let current = pool.allocate(60).unwrap();

        assert!(pool.allocate(10).is_err());
        assert!(pool.allocate_replacing(101, Some(&current)).unwrap_err().is_allocation());

        let next = pool.allocate_replacing(40, Some(&current)).unwrap();
        assert_eq!(pool.live_frames(), 2);
        drop(current);
        assert_eq!(pool.live_frames(), 1);
        assert_eq!(pool.live_bytes(), 40);
        drop(next);
        assert_eq!(pool.live_bytes(), 0);
    }

    #[test]
    fn test_clones_share_usage() {
        let pool = FramePool::new(1, 0);
        let clone = pool.clone();
        let _lease = pool.allocate(4).unwrap();
        assert_eq!(clone.live_frames(), 1);
        assert!(clone.allocate(4).is_err());
    }
}
