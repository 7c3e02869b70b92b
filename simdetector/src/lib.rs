/*!
# Simulated Area Detector

Stands in for area-detector hardware during software integration. A
[`SimDetector`] synthesizes image frames on a timed cadence from a background
thread and delivers them to registered [`FrameSink`]s, driven entirely through
named parameters.

## Example

```no_run
use simdetector::{ImageMode, SimDetector};
use shared::DataType;
use std::sync::Arc;

let detector = SimDetector::new(640, 480, DataType::UInt16, 0, 0)?;
detector.add_frame_sink(Arc::new(|frame: shared::frame::ArcFrame| {
    println!("frame {} ({}x{})", frame.unique_id(), frame.size_x(), frame.size_y());
}));
detector.set_image_mode(ImageMode::Multiple, 10)?;
detector.start_acquisition()?;
# Ok::<(), shared::SimError>(())
```

## Modules

- [`params`] - Parameter table and acquisition state
- [`synth`] - Pixel synthesis
- [`buffer`] - Raw buffer and current frame ownership
- [`builder`] - Geometry clamping and frame extraction
- [`acquisition`] - Background Idle/Exposing/Readout loop
- [`control`] - Parameter writes and their side effects
- [`sink`] - Frame consumers
- [`config`] - TOML configuration
*/

pub mod acquisition;
pub mod buffer;
pub mod builder;
pub mod config;
pub mod control;
pub mod detector;
pub mod params;
pub mod sink;
pub mod synth;

pub use config::AppConfig;
pub use detector::SimDetector;
pub use params::{AcquisitionState, ImageMode, ParamId, ParamKind, ParamUpdate, ParamValue};
pub use sink::{ChannelSink, FrameSink};
