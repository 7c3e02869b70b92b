/*!
Control interface.

Client parameter writes and reads. Every write is serialized under the detector
lock: the value is stored, its side effects are applied (starting or stopping
the acquisition thread, invalidating the accumulated image, recomputing the
frame countdown) and observers are notified of whatever changed.
*/

use crate::detector::{DetectorState, SimDetector};
use crate::params::{AcquisitionState, ImageMode, ParamId, ParamValue};
use crossbeam_channel::{Sender, TrySendError};
use shared::{Result, SimError};
use tracing::{debug, error, trace};

/// Wake the acquisition thread; at most one signal stays pending
fn signal(tx: &Sender<()>, what: &str) {
    match tx.try_send(()) {
        Ok(()) => debug!("Sent {} signal", what),
        Err(TrySendError::Full(())) => debug!("{} signal already pending", what),
        Err(TrySendError::Disconnected(())) => error!("Acquisition thread is not running, {} ignored", what),
    }
}

impl SimDetector {
    /// Write an integer parameter
    pub fn write_int(&self, id: ParamId, value: i32) -> Result<()> {
        self.write(id, ParamValue::Int(value))
    }

    /// Write a floating point parameter
    pub fn write_float(&self, id: ParamId, value: f64) -> Result<()> {
        self.write(id, ParamValue::Float(value))
    }

    /// Write a parameter by its external name
    pub fn write_by_name(&self, name: &str, value: ParamValue) -> Result<()> {
        self.write(ParamId::from_name(name)?, value)
    }

    /// Store a value, apply its side effects and notify observers
    pub fn write(&self, id: ParamId, value: ParamValue) -> Result<()> {
        let mut state = self.lock();
        let result = self.apply(&mut state, id, &value);
        state.notify_params();
        drop(state);

        match &result {
            Ok(()) => trace!("Wrote {} = {}", id, value),
            Err(e) => error!("Error writing {} = {}: {}", id, value, e),
        }
        result
    }

    fn apply(&self, state: &mut DetectorState, id: ParamId, value: &ParamValue) -> Result<()> {
        let status = state.params.status;
        state.params.store(id, value)?;

        match id {
            ParamId::Acquire => {
                if state.params.acquire && status == AcquisitionState::Idle {
                    state.images_remaining = state.params.image_mode.images_remaining(state.params.num_images);
                    signal(&self.start_tx, "start");
                }
                if !state.params.acquire && status != AcquisitionState::Idle {
                    signal(&self.stop_tx, "stop");
                }
            }
            // The mode may change mid-acquisition
            ParamId::ImageMode => {
                state.images_remaining = state.params.image_mode.images_remaining(state.params.num_images);
            }
            id if id.resets_image() => state.params.reset_image = true,
            _ => {}
        }
        Ok(())
    }

    /// Apply a batch of writes by name. Every valid entry is applied; the
    /// names of the failing entries are collected into one error.
    pub fn write_batch<'a, I>(&self, writes: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, ParamValue)>,
    {
        let mut failed = Vec::new();
        for (name, value) in writes {
            if self.write_by_name(name, value).is_err() {
                failed.push(name.to_string());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            error!("{} parameter writes failed: {}", failed.len(), failed.join(", "));
            Err(SimError::ParamBatch(failed))
        }
    }

    /// Current value of a parameter
    pub fn read(&self, id: ParamId) -> ParamValue {
        self.lock().params.get(id)
    }

    /// Current value of a parameter by its external name
    pub fn read_by_name(&self, name: &str) -> Result<ParamValue> {
        Ok(self.read(ParamId::from_name(name)?))
    }

    pub fn read_int(&self, id: ParamId) -> Result<i32> {
        self.read(id).as_int().ok_or(SimError::WrongType {
            param: id.name(),
            expected: "integer",
        })
    }

    pub fn read_float(&self, id: ParamId) -> Result<f64> {
        self.read(id).as_float().ok_or(SimError::WrongType {
            param: id.name(),
            expected: "float",
        })
    }

    pub fn read_text(&self, id: ParamId) -> Result<String> {
        match self.read(id) {
            ParamValue::Text(text) => Ok(text),
            _ => Err(SimError::WrongType {
                param: id.name(),
                expected: "string",
            }),
        }
    }

    /// Every parameter with its current value, in table order
    pub fn params(&self) -> Vec<(ParamId, ParamValue)> {
        let state = self.lock();
        ParamId::ALL.iter().map(|id| (*id, state.params.get(*id))).collect()
    }

    /// Set the image mode and the frame count used by [`ImageMode::Multiple`]
    pub fn set_image_mode(&self, mode: ImageMode, num_images: i32) -> Result<()> {
        self.write_int(ParamId::NumImages, num_images)?;
        self.write_int(ParamId::ImageMode, mode.code())
    }

    pub fn start_acquisition(&self) -> Result<()> {
        self.write_int(ParamId::Acquire, 1)
    }

    pub fn stop_acquisition(&self) -> Result<()> {
        self.write_int(ParamId::Acquire, 0)
    }

    pub fn status(&self) -> AcquisitionState {
        self.lock().params.status
    }

    pub fn is_acquiring(&self) -> bool {
        self.lock().params.acquire
    }

    pub fn frame_counter(&self) -> i32 {
        self.lock().params.image_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamUpdate;
    use crate::sink::ChannelSink;
    use crossbeam_channel::{unbounded, Receiver};
    use shared::frame::ArcFrame;
    use shared::DataType;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(150);

    fn detector(max: usize, data_type: DataType) -> (SimDetector, Receiver<ArcFrame>) {
        let detector = SimDetector::new(max, max, data_type, 0, 0).unwrap();
        let (tx, rx) = unbounded();
        detector.add_frame_sink(Arc::new(ChannelSink::new(tx)));
        (detector, rx)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn test_single_mode_delivers_one_frame() {
        let (detector, frames) = detector(8, DataType::UInt8);
        detector.set_image_mode(ImageMode::Single, 10).unwrap();
        detector.start_acquisition().unwrap();

        let frame = frames.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(frame.unique_id(), 1);
        assert!(wait_until(|| detector.status() == AcquisitionState::Idle && !detector.is_acquiring()));
        assert!(frames.recv_timeout(QUIET).is_err());
        assert_eq!(detector.read_int(ParamId::Acquire).unwrap(), 0);
    }

    #[test]
    fn test_multiple_mode_countdown() {
        let (detector, frames) = detector(8, DataType::UInt16);
        detector.set_image_mode(ImageMode::Multiple, 3).unwrap();
        detector.start_acquisition().unwrap();

        let ids: Vec<i32> = (0..3)
            .map(|_| frames.recv_timeout(TIMEOUT).unwrap().unique_id())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        assert!(wait_until(|| !detector.is_acquiring()));
        assert!(frames.recv_timeout(QUIET).is_err());
        assert_eq!(detector.frame_counter(), 3);

        // A second acquisition continues the counter
        detector.start_acquisition().unwrap();
        let ids: Vec<i32> = (0..3)
            .map(|_| frames.recv_timeout(TIMEOUT).unwrap().unique_id())
            .collect();
        assert_eq!(ids, vec![4, 5, 6]);
    }

    #[test]
    fn test_continuous_never_self_stops() {
        let (detector, frames) = detector(4, DataType::Float32);
        detector.set_image_mode(ImageMode::Continuous, 2).unwrap();
        detector.start_acquisition().unwrap();

        let mut last = 0;
        for _ in 0..5 {
            let id = frames.recv_timeout(TIMEOUT).unwrap().unique_id();
            assert!(id > last);
            last = id;
        }
        assert!(detector.is_acquiring());

        detector.stop_acquisition().unwrap();
        assert!(wait_until(|| detector.status() == AcquisitionState::Idle));
    }

    #[test]
    fn test_reset_frame_matches_gradient() {
        let (detector, frames) = detector(10, DataType::Int32);
        detector.set_image_mode(ImageMode::Single, 1).unwrap();
        detector.write_float(ParamId::Gain, 1.0).unwrap();
        detector.write_float(ParamId::GainX, 1.0).unwrap();
        detector.write_float(ParamId::GainY, 1.0).unwrap();
        detector.write_float(ParamId::AcquireTime, 0.001).unwrap();
        detector.start_acquisition().unwrap();

        let frame = frames.recv_timeout(TIMEOUT).unwrap();
        assert_eq!((frame.size_x(), frame.size_y()), (10, 10));
        assert_eq!(frame.pixel::<i32>(0, 0), Some(1));
        assert_eq!(frame.pixel::<i32>(9, 9), Some(19));
        for row in 0..10 {
            for col in 0..10 {
                assert_eq!(frame.pixel::<i32>(col, row), Some((col + row + 1) as i32));
            }
        }
    }

    #[test]
    fn test_accumulation_between_frames() {
        let (detector, frames) = detector(6, DataType::Int16);
        detector.set_image_mode(ImageMode::Multiple, 2).unwrap();
        detector.write_float(ParamId::Gain, 2.0).unwrap();
        detector.start_acquisition().unwrap();

        let first = frames.recv_timeout(TIMEOUT).unwrap().to_vec::<i16>().unwrap();
        let second = frames.recv_timeout(TIMEOUT).unwrap().to_vec::<i16>().unwrap();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(*b, a + 2);
        }
    }

    #[test]
    fn test_writes_set_reset_flag() {
        let (detector, frames) = detector(4, DataType::UInt8);
        detector.set_image_mode(ImageMode::Single, 1).unwrap();
        detector.start_acquisition().unwrap();
        frames.recv_timeout(TIMEOUT).unwrap();
        assert!(wait_until(|| !detector.is_acquiring()));
        assert_eq!(detector.read_int(ParamId::ResetImage).unwrap(), 0);

        detector.write_int(ParamId::NumImages, 4).unwrap();
        assert_eq!(detector.read_int(ParamId::ResetImage).unwrap(), 0);

        detector.write_int(ParamId::BinX, 2).unwrap();
        assert_eq!(detector.read_int(ParamId::ResetImage).unwrap(), 1);

        detector.write_int(ParamId::ResetImage, 0).unwrap();
        detector.write_float(ParamId::GainY, 3.0).unwrap();
        assert_eq!(detector.read_int(ParamId::ResetImage).unwrap(), 1);
    }

    #[test]
    fn test_stop_during_exposure_still_delivers() {
        let (detector, frames) = detector(4, DataType::UInt8);
        detector.set_image_mode(ImageMode::Continuous, 1).unwrap();
        detector.write_float(ParamId::AcquireTime, 30.0).unwrap();
        detector.start_acquisition().unwrap();
        assert!(wait_until(|| detector.status() == AcquisitionState::Exposing));

        let stopped = Instant::now();
        detector.stop_acquisition().unwrap();

        let frame = frames.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(frame.unique_id(), 1);
        assert!(stopped.elapsed() < TIMEOUT);
        assert!(wait_until(|| detector.status() == AcquisitionState::Idle));
    }

    #[test]
    fn test_frame_stamped_at_cycle_start() {
        let (detector, frames) = detector(4, DataType::UInt8);
        detector.set_image_mode(ImageMode::Single, 1).unwrap();
        detector.write_float(ParamId::AcquireTime, 0.3).unwrap();

        let started = chrono::Utc::now();
        detector.start_acquisition().unwrap();
        let frame = frames.recv_timeout(TIMEOUT).unwrap();
        let received = chrono::Utc::now();

        // Stamped before the exposure wait, not after the build
        assert!(frame.timestamp() >= started);
        assert!(frame.timestamp() - started < chrono::Duration::milliseconds(150));
        assert!(received - frame.timestamp() >= chrono::Duration::milliseconds(250));
    }

    #[test]
    fn test_stop_during_readout() {
        let (detector, frames) = detector(4, DataType::UInt8);
        detector.set_image_mode(ImageMode::Continuous, 1).unwrap();
        detector.write_float(ParamId::AcquirePeriod, 30.0).unwrap();
        detector.start_acquisition().unwrap();

        frames.recv_timeout(TIMEOUT).unwrap();
        assert!(wait_until(|| detector.status() == AcquisitionState::Readout));

        detector.stop_acquisition().unwrap();
        assert!(wait_until(|| detector.status() == AcquisitionState::Idle));
        assert!(frames.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn test_stop_signal_keeps_one_pending() {
        const EXPOSURE: f64 = 0.5;
        let (detector, frames) = detector(4, DataType::UInt8);
        detector.set_image_mode(ImageMode::Continuous, 1).unwrap();
        detector.write_float(ParamId::AcquireTime, EXPOSURE).unwrap();
        detector.write_float(ParamId::AcquirePeriod, 0.0).unwrap();

        // Hold the acquisition thread inside delivery of the first frame
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        detector.add_frame_sink(Arc::new(move |frame: ArcFrame| {
            if frame.unique_id() == 1 {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
            }
        }));

        detector.start_acquisition().unwrap();
        entered_rx.recv_timeout(TIMEOUT).unwrap();
        frames.recv_timeout(TIMEOUT).unwrap();

        // Nobody is waiting on the stop signal here
        detector.stop_acquisition().unwrap();
        detector.stop_acquisition().unwrap();
        detector.start_acquisition().unwrap();
        assert!(detector.is_acquiring());

        let released = Instant::now();
        release_tx.send(()).unwrap();

        // The pending stop cuts the next exposure short
        let second = frames.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(second.unique_id(), 2);
        assert!(released.elapsed() < Duration::from_secs_f64(EXPOSURE / 2.0));

        // The second stop was not queued, so this exposure runs in full
        let second_at = Instant::now();
        let third = frames.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(third.unique_id(), 3);
        assert!(second_at.elapsed() >= Duration::from_secs_f64(EXPOSURE * 0.8));

        detector.stop_acquisition().unwrap();
        assert!(wait_until(|| detector.status() == AcquisitionState::Idle));
    }

    #[test]
    fn test_mode_change_while_acquiring() {
        let (detector, frames) = detector(4, DataType::UInt8);
        detector.set_image_mode(ImageMode::Continuous, 2).unwrap();
        detector.write_float(ParamId::AcquirePeriod, 0.02).unwrap();
        detector.start_acquisition().unwrap();
        frames.recv_timeout(TIMEOUT).unwrap();

        detector.write_int(ParamId::ImageMode, ImageMode::Multiple.code()).unwrap();
        assert!(wait_until(|| !detector.is_acquiring()));
        assert!(detector.frame_counter() <= 4);
    }

    #[test]
    fn test_clamped_geometry_is_visible() {
        let (detector, frames) = detector(8, DataType::UInt8);
        detector.set_image_mode(ImageMode::Single, 1).unwrap();
        detector.write_int(ParamId::MinX, -5).unwrap();
        detector.write_int(ParamId::SizeX, 100).unwrap();
        detector.write_int(ParamId::BinY, 0).unwrap();
        detector.start_acquisition().unwrap();

        let frame = frames.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(detector.read_int(ParamId::MinX).unwrap(), 0);
        assert_eq!(detector.read_int(ParamId::SizeX).unwrap(), 8);
        assert_eq!(detector.read_int(ParamId::BinY).unwrap(), 1);
        assert_eq!(frame.size_x(), 8);
        assert_eq!(detector.read_int(ParamId::ImageSizeX).unwrap(), 8);
        assert_eq!(detector.read_int(ParamId::ImageSize).unwrap(), 64);
    }

    #[test]
    fn test_sink_can_reenter_detector() {
        let detector = SimDetector::new(4, 4, DataType::UInt8, 0, 0).unwrap();
        let (tx, rx) = unbounded();
        let probe = detector.clone();
        detector.add_frame_sink(Arc::new(move |frame: ArcFrame| {
            let counter = probe.frame_counter();
            let _ = probe.read(ParamId::Status);
            let _ = tx.send((frame.unique_id(), counter));
        }));

        detector.set_image_mode(ImageMode::Multiple, 2).unwrap();
        detector.start_acquisition().unwrap();

        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), (1, 1));
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), (2, 2));
    }

    #[test]
    fn test_param_observers() {
        let (detector, frames) = detector(4, DataType::UInt8);
        detector.set_image_mode(ImageMode::Single, 1).unwrap();
        let updates = detector.subscribe_params();
        detector.start_acquisition().unwrap();
        frames.recv_timeout(TIMEOUT).unwrap();

        let mut seen = Vec::new();
        loop {
            let update = updates.recv_timeout(TIMEOUT).unwrap();
            let done = update.id == ParamId::Acquire && update.value == ParamValue::Int(0);
            seen.push(update);
            if done {
                break;
            }
        }

        let saw = |id, value| seen.contains(&ParamUpdate { id, value });
        assert!(saw(ParamId::Acquire, ParamValue::Int(1)));
        assert!(saw(ParamId::Status, ParamValue::Int(AcquisitionState::Exposing.code())));
        assert!(saw(ParamId::ImageCounter, ParamValue::Int(1)));
    }

    #[test]
    fn test_write_errors() {
        let (detector, _frames) = detector(4, DataType::UInt8);

        assert!(matches!(
            detector.write_int(ParamId::Status, 2),
            Err(SimError::ReadOnly("STATUS"))
        ));
        assert!(matches!(
            detector.write_by_name("BOGUS", ParamValue::Int(1)),
            Err(SimError::UnknownParam(_))
        ));
        assert!(detector.read_text(ParamId::Gain).is_err());
        assert_eq!(detector.read_text(ParamId::Model).unwrap(), "Basic simulator");

        let result = detector.write_batch([
            ("BIN_X", ParamValue::Int(2)),
            ("BOGUS", ParamValue::Int(1)),
            ("GAIN", ParamValue::Float(4.0)),
            ("STATUS", ParamValue::Int(1)),
        ]);
        match result {
            Err(SimError::ParamBatch(failed)) => assert_eq!(failed, vec!["BOGUS", "STATUS"]),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(detector.read_int(ParamId::BinX).unwrap(), 2);
        assert_eq!(detector.read_float(ParamId::Gain).unwrap(), 4.0);
    }

    #[test]
    fn test_pool_exhaustion_is_not_fatal() {
        let detector = SimDetector::new(4, 4, DataType::UInt8, 1, 0).unwrap();
        let (tx, frames) = unbounded();
        detector.add_frame_sink(Arc::new(ChannelSink::new(tx)));
        detector.set_image_mode(ImageMode::Continuous, 1).unwrap();
        detector.start_acquisition().unwrap();

        // Holding the first frame leaves no pool buffer for the next one
        let first = frames.recv_timeout(TIMEOUT).unwrap();
        assert!(frames.recv_timeout(QUIET).is_err());
        assert_eq!(detector.frame_counter(), 1);

        drop(first);
        let second = frames.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(second.unique_id(), 2);
        drop(second);

        detector.stop_acquisition().unwrap();
        assert!(wait_until(|| detector.status() == AcquisitionState::Idle));
    }
}
