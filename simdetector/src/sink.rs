/*!
Downstream frame consumers.

Sinks are called from the acquisition thread once per completed frame, after
the detector lock has been released, so a sink may call back into the detector.
A slow sink delays the next acquisition cycle.
*/

use crossbeam_channel::Sender;
use shared::frame::ArcFrame;
use tracing::warn;

/// Receives every frame the detector produces
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: ArcFrame);
}

impl<F> FrameSink for F
where
    F: Fn(ArcFrame) + Send + Sync,
{
    fn on_frame(&self, frame: ArcFrame) {
        self(frame)
    }
}

/// Forwards frames into a channel
pub struct ChannelSink {
    tx: Sender<ArcFrame>,
}

impl ChannelSink {
    pub fn new(tx: Sender<ArcFrame>) -> Self {
        Self { tx }
    }
}

impl FrameSink for ChannelSink {
    fn on_frame(&self, frame: ArcFrame) {
        let id = frame.unique_id();
        if self.tx.send(frame).is_err() {
            warn!("Frame channel disconnected, dropping frame {}", id);
        }
    }
}
