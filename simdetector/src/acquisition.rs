/*!
Background acquisition loop.

State machine over Idle, Exposing and Readout:

1. Idle: while the acquire flag is clear, publish Idle and block on the start
   signal, then check again.
2. Exposing: wait for the exposure time (a stop signal ends the wait early),
   build a frame, bump the frame counter and deliver the frame to the sinks
   with the lock released.
3. Readout: if still acquiring, wait out the rest of the acquire period (a
   stop signal ends the wait early) and go back to 1.

The loop holds the detector lock for parameter access, buffer sizing and
synthesis only. It never holds it while waiting or while calling sinks.
*/

use crate::builder::{build_frame, FrameStamp};
use crate::detector::{lock_state, DetectorState};
use crate::params::AcquisitionState;
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

pub(crate) struct AcquisitionTask {
    state: Arc<Mutex<DetectorState>>,
    start_rx: Receiver<()>,
    stop_rx: Receiver<()>,
}

impl AcquisitionTask {
    pub fn new(state: Arc<Mutex<DetectorState>>, start_rx: Receiver<()>, stop_rx: Receiver<()>) -> Self {
        Self {
            state,
            start_rx,
            stop_rx,
        }
    }

    /// Run until every detector handle has been dropped
    pub fn run(self) {
        debug!("Acquisition task started");

        loop {
            let mut state = lock_state(&self.state);

            if !state.params.acquire {
                state.set_status(AcquisitionState::Idle);
                state.notify_params();
                drop(state);

                debug!("Waiting for acquire to start");
                if self.start_rx.recv().is_err() {
                    break;
                }
                continue;
            }

            if !self.acquire_frame(state) {
                break;
            }
        }

        debug!("Acquisition task stopped, all detector handles dropped");
    }

    /// One Exposing/Readout cycle, entered with the lock held. Returns false
    /// once the signal channels have disconnected.
    fn acquire_frame(&self, mut state: MutexGuard<'_, DetectorState>) -> bool {
        let started = Instant::now();
        let timestamp = Utc::now();
        let acquire_time = state.params.acquire_time;
        let acquire_period = state.params.acquire_period;

        state.set_status(AcquisitionState::Exposing);
        state.notify_params();
        drop(state);

        // A stop request shortens the exposure but the frame is still built.
        if !self.wait_for_stop(acquire_time) {
            return false;
        }

        let mut state = lock_state(&self.state);
        let stamp = FrameStamp {
            unique_id: state.params.image_counter.wrapping_add(1),
            timestamp,
        };

        let DetectorState { params, buffers, .. } = &mut *state;
        let frame = match build_frame(params, buffers, stamp) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to build frame {}: {}", stamp.unique_id, e);
                state.notify_params();
                return true;
            }
        };

        state.params.image_counter = stamp.unique_id;
        state.notify_params();
        let sinks = state.sinks.clone();
        drop(state);

        // Sinks may call back into the detector, so the lock must be free here.
        trace!("Delivering frame {} to {} sinks", stamp.unique_id, sinks.len());
        for sink in &sinks {
            sink.on_frame(Arc::clone(&frame));
        }
        drop(frame);
        let elapsed = started.elapsed().as_secs_f64();

        let mut state = lock_state(&self.state);
        if state.images_remaining > 0 {
            state.images_remaining -= 1;
        }
        if state.images_remaining == 0 {
            state.params.acquire = false;
            state.set_status(AcquisitionState::Idle);
            info!("Acquisition completed at frame {}", stamp.unique_id);
        }

        if !state.params.acquire {
            state.notify_params();
            return true;
        }

        state.set_status(AcquisitionState::Readout);
        state.notify_params();
        drop(state);

        let delay = acquire_period - elapsed;
        debug!("Readout delay {:.6}s", delay);
        self.wait_for_stop(delay)
    }

    /// Block for up to `seconds` or until a stop signal arrives. Returns false
    /// if the stop channel has disconnected.
    fn wait_for_stop(&self, seconds: f64) -> bool {
        let timeout = match Duration::try_from_secs_f64(seconds) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            _ => return true,
        };

        match self.stop_rx.recv_timeout(timeout) {
            Ok(()) => {
                debug!("Wait cut short by stop request");
                true
            }
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}
