/*!
The simulated detector handle.

A [`SimDetector`] owns the state shared with its acquisition thread: the
parameters, the raw buffer and current frame, the registered frame sinks and the
parameter observers, all behind one mutex. Two single-slot channels carry the
start and stop signals to the acquisition thread.
*/

use crate::acquisition::AcquisitionTask;
use crate::buffer::BufferManager;
use crate::config::DetectorConfig;
use crate::params::{AcquisitionParams, AcquisitionState, ParamId, ParamUpdate, ParamValue};
use crate::sink::FrameSink;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use shared::frame::ArcFrame;
use shared::{DataType, FramePool, Result, SimError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{error, info};

/// Everything guarded by the detector lock
pub(crate) struct DetectorState {
    pub params: AcquisitionParams,
    /// Frames left in this acquisition; -1 never runs out
    pub images_remaining: i32,
    pub buffers: BufferManager,
    pub sinks: Vec<Arc<dyn FrameSink>>,
    observers: Vec<Sender<ParamUpdate>>,
    published: Vec<ParamValue>,
}

impl DetectorState {
    fn new(params: AcquisitionParams, pool: FramePool) -> Self {
        let published = params.snapshot();
        Self {
            params,
            images_remaining: 0,
            buffers: BufferManager::new(pool),
            sinks: Vec::new(),
            observers: Vec::new(),
            published,
        }
    }

    pub fn set_status(&mut self, status: AcquisitionState) {
        self.params.status = status;
    }

    /// Send every parameter that changed since the last call to the observers
    pub fn notify_params(&mut self) {
        let current = self.params.snapshot();

        for ((id, old), new) in ParamId::ALL.iter().zip(&self.published).zip(&current) {
            if old == new {
                continue;
            }
            let update = ParamUpdate {
                id: *id,
                value: new.clone(),
            };
            self.observers.retain(|tx| tx.send(update.clone()).is_ok());
        }

        self.published = current;
    }
}

/// Lock the detector state, recovering from a poisoned lock
pub(crate) fn lock_state(state: &Mutex<DetectorState>) -> MutexGuard<'_, DetectorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a simulated area detector.
///
/// Handles are cheap to clone. The acquisition thread exits once every handle
/// has been dropped.
#[derive(Clone)]
pub struct SimDetector {
    pub(crate) state: Arc<Mutex<DetectorState>>,
    pub(crate) start_tx: Sender<()>,
    pub(crate) stop_tx: Sender<()>,
}

impl SimDetector {
    /// Create a detector and start its acquisition thread.
    ///
    /// `max_buffers` and `max_memory` bound the output frames alive at once;
    /// 0 means unlimited. If the thread cannot be started the detector is
    /// still returned but never produces frames.
    pub fn new(
        max_size_x: usize,
        max_size_y: usize,
        data_type: DataType,
        max_buffers: usize,
        max_memory: usize,
    ) -> Result<Self> {
        let to_param = |size: usize, axis: &str| {
            i32::try_from(size)
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| SimError::invalid_geometry(format!("max size {} = {}", axis, size)))
        };
        let params = AcquisitionParams::new(to_param(max_size_x, "X")?, to_param(max_size_y, "Y")?, data_type);

        let state = Arc::new(Mutex::new(DetectorState::new(
            params,
            FramePool::new(max_buffers, max_memory),
        )));
        let (start_tx, start_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);

        let task = AcquisitionTask::new(Arc::clone(&state), start_rx, stop_rx);
        match thread::Builder::new()
            .name("SimDetTask".to_string())
            .spawn(move || task.run())
        {
            Ok(_) => info!(
                "📷 Simulated detector created: {}x{} {}",
                max_size_x, max_size_y, data_type
            ),
            Err(e) => error!(
                "Failed to start acquisition thread, detector will not produce frames: {}",
                e
            ),
        }

        Ok(Self {
            state,
            start_tx,
            stop_tx,
        })
    }

    /// Create a detector from the `[detector]` configuration section
    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        Self::new(
            config.max_size_x,
            config.max_size_y,
            config.data_type,
            config.max_buffers,
            config.max_memory,
        )
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DetectorState> {
        lock_state(&self.state)
    }

    /// Register a consumer for every future frame
    pub fn add_frame_sink(&self, sink: Arc<dyn FrameSink>) {
        self.lock().sinks.push(sink);
    }

    /// Receive a [`ParamUpdate`] for every parameter change from now on
    pub fn subscribe_params(&self) -> Receiver<ParamUpdate> {
        let (tx, rx) = unbounded();
        self.lock().observers.push(tx);
        rx
    }

    /// The most recently built frame, if any
    pub fn current_frame(&self) -> Option<ArcFrame> {
        self.lock().buffers.current().cloned()
    }

    /// Number of output frames alive, including the current frame
    pub fn live_frames(&self) -> usize {
        self.lock().buffers.pool().live_frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_geometry() {
        assert!(matches!(
            SimDetector::new(0, 10, DataType::UInt8, 0, 0),
            Err(SimError::InvalidGeometry(_))
        ));
        assert!(SimDetector::new(10, usize::MAX, DataType::UInt8, 0, 0).is_err());
    }

    #[test]
    fn test_starts_idle_without_frames() {
        let detector = SimDetector::new(8, 8, DataType::UInt16, 0, 0).unwrap();
        assert!(detector.current_frame().is_none());
        assert_eq!(detector.live_frames(), 0);
        assert_eq!(detector.lock().params.status, AcquisitionState::Idle);
    }

    #[test]
    fn test_notify_sends_only_changes() {
        let params = AcquisitionParams::new(4, 4, DataType::UInt8);
        let mut state = DetectorState::new(params, FramePool::new(0, 0));
        let (tx, rx) = unbounded();
        state.observers.push(tx);

        state.notify_params();
        assert!(rx.try_recv().is_err());

        state.params.gain = 2.0;
        state.params.bin_x = 2;
        state.notify_params();
        let updates: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            updates,
            vec![
                ParamUpdate {
                    id: ParamId::BinX,
                    value: ParamValue::Int(2)
                },
                ParamUpdate {
                    id: ParamId::Gain,
                    value: ParamValue::Float(2.0)
                },
            ]
        );
    }

    #[test]
    fn test_disconnected_observers_are_dropped() {
        let params = AcquisitionParams::new(4, 4, DataType::UInt8);
        let mut state = DetectorState::new(params, FramePool::new(0, 0));
        let (tx, rx) = unbounded();
        state.observers.push(tx);
        drop(rx);

        state.params.min_x = 1;
        state.notify_params();
        assert!(state.observers.is_empty());
    }
}
