/*!
Frame data structures.

This module provides the immutable output frame handed to consumers. A frame
owns its pixel bytes through a reference-counted [`Bytes`] and is itself shared
as an [`ArcFrame`]; the detector and every consumer hold independent references.
*/

use crate::data_type::{DataType, Sample};
use crate::error::{Result, SimError};
use crate::pool::FrameLease;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared handle to an output frame
pub type ArcFrame = Arc<ImageFrame>;

/// How one output axis was derived from the raw buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimension {
    /// Number of output pixels along this axis
    pub size: usize,
    /// First raw pixel used along this axis
    pub offset: usize,
    /// Raw pixels summed into one output pixel
    pub binning: usize,
    /// Output axis is reversed
    pub reverse: bool,
}

impl FrameDimension {
    /// Plain axis of `size` pixels with no offset, binning or reversal
    pub fn new(size: usize) -> Self {
        Self {
            size,
            offset: 0,
            binning: 1,
            reverse: false,
        }
    }
}

/// Immutable output frame
#[derive(Debug)]
pub struct ImageFrame {
    unique_id: i32,
    timestamp: DateTime<Utc>,
    data_type: DataType,
    dims: [FrameDimension; 2],
    data: Bytes,
    lease: Option<FrameLease>,
}

impl ImageFrame {
    /// Create a frame, checking that `data` matches the dimensions
    pub fn new(
        unique_id: i32,
        timestamp: DateTime<Utc>,
        data_type: DataType,
        dims: [FrameDimension; 2],
        data: Bytes,
        lease: Option<FrameLease>,
    ) -> Result<Self> {
        let expected = dims[0].size * dims[1].size * data_type.sample_size();
        if data.len() != expected {
            return Err(SimError::invalid_value(
                "frame data",
                format!("{} bytes, expected {}", data.len(), expected),
            ));
        }

        Ok(Self {
            unique_id,
            timestamp,
            data_type,
            dims,
            data,
            lease,
        })
    }

    /// Frame counter value at the time this frame was produced
    pub fn unique_id(&self) -> i32 {
        self.unique_id
    }

    /// Start of the exposure that produced this frame
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Timestamp as seconds past the Unix epoch
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.timestamp() as f64 + f64::from(self.timestamp.timestamp_subsec_nanos()) / 1e9
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Output dimensions, X first
    pub fn dims(&self) -> &[FrameDimension; 2] {
        &self.dims
    }

    pub fn size_x(&self) -> usize {
        self.dims[0].size
    }

    pub fn size_y(&self) -> usize {
        self.dims[1].size
    }

    /// Total size of the pixel data in bytes
    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }

    /// Raw pixel bytes in native byte order, row-major
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Pool capacity held by this frame, if it came from a pool
    pub fn lease(&self) -> Option<&FrameLease> {
        self.lease.as_ref()
    }

    /// Typed pixel at column `x`, row `y`; `None` if out of range or `T` is
    /// not this frame's representation
    pub fn pixel<T: Sample>(&self, x: usize, y: usize) -> Option<T> {
        if T::DATA_TYPE != self.data_type || x >= self.size_x() || y >= self.size_y() {
            return None;
        }
        let offset = (y * self.size_x() + x) * T::SIZE;
        Some(T::read_ne(&self.data[offset..]))
    }

    /// Pixel at column `x`, row `y` widened to `f64`
    pub fn pixel_f64(&self, x: usize, y: usize) -> Option<f64> {
        crate::with_sample_type!(self.data_type, T => self.pixel::<T>(x, y).map(|v| v.as_()))
    }

    /// All pixels as a typed vector, row-major
    pub fn to_vec<T: Sample>(&self) -> Option<Vec<T>> {
        if T::DATA_TYPE != self.data_type {
            return None;
        }
        Some(self.data.chunks_exact(T::SIZE).map(T::read_ne).collect())
    }

    /// Compute a serialisable summary of this frame
    pub fn summary(&self) -> FrameSummary {
        let (min, max, mean) = crate::with_sample_type!(self.data_type, T => pixel_stats::<T>(&self.data));

        FrameSummary {
            unique_id: self.unique_id,
            timestamp: self.timestamp_secs(),
            data_type: self.data_type,
            size_x: self.size_x(),
            size_y: self.size_y(),
            total_bytes: self.total_bytes(),
            min,
            max,
            mean,
        }
    }
}

/// Min, max and mean of every sample, all zero for an empty frame
fn pixel_stats<T: Sample>(data: &[u8]) -> (f64, f64, f64) {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for chunk in data.chunks_exact(T::SIZE) {
        let value: f64 = T::read_ne(chunk).as_();
        min = min.min(value);
        max = max.max(value);
        sum += value;
        count += 1;
    }

    if count == 0 {
        (0.0, 0.0, 0.0)
    } else {
        (min, max, sum / count as f64)
    }
}

/// Per-frame metadata and statistics for logging and live output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub unique_id: i32,
    pub timestamp: f64,
    pub data_type: DataType,
    pub size_x: usize,
    pub size_y: usize,
    pub total_bytes: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}
