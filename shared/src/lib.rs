/*!
# Shared Types and Utilities

This crate contains the types shared between the simulated detector engine and
anything that consumes its frames.

## Core Types

- [`DataType`] - Closed set of pixel numeric representations
- [`Sample`] - Fixed-width truncation/wrap rules for one representation
- [`ImageFrame`] - Immutable, reference-counted output frame
- [`FramePool`] - Bounded accounting of live output frames

## Modules

- [`data_type`] - Numeric representations and sample conversion
- [`frame`] - Output frame data structures
- [`pool`] - Frame allocation limits
- [`error`] - Common error types
*/

pub mod data_type;
pub mod error;
pub mod frame;
pub mod pool;

// Re-export commonly used types
pub use data_type::{DataType, Sample};
pub use error::{SimError, Result};
pub use frame::{FrameDimension, FrameSummary, ImageFrame};
pub use pool::{FrameLease, FramePool};
