/*!
Frame building.

Turns the current parameters into one output frame: clamp the geometry, make
sure the raw buffer is large enough, run the synthesizer over the full raw
buffer, then extract the region of interest with binning and axis reversal.

The caller must hold the detector lock for the whole build.
*/

use crate::buffer::BufferManager;
use crate::params::AcquisitionParams;
use crate::synth::{compute_image, SynthParams};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use shared::frame::ArcFrame;
use shared::{with_sample_type, FrameDimension, ImageFrame, Result, Sample, SimError};
use tracing::{debug, error};

/// Identity given to a frame when it is built.
///
/// `timestamp` is the start of the acquisition cycle that produced the frame,
/// taken before the exposure wait, not the time the build finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStamp {
    pub unique_id: i32,
    pub timestamp: DateTime<Utc>,
}

/// Region of interest after clamping, all values in raw pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub bin_x: usize,
    pub bin_y: usize,
    pub min_x: usize,
    pub min_y: usize,
    pub size_x: usize,
    pub size_y: usize,
    pub reverse_x: bool,
    pub reverse_y: bool,
}

impl Geometry {
    /// Output frame width
    pub fn out_size_x(&self) -> usize {
        self.size_x / self.bin_x
    }

    /// Output frame height
    pub fn out_size_y(&self) -> usize {
        self.size_y / self.bin_y
    }

    fn dims(&self) -> [FrameDimension; 2] {
        [
            FrameDimension {
                size: self.out_size_x(),
                offset: self.min_x,
                binning: self.bin_x,
                reverse: self.reverse_x,
            },
            FrameDimension {
                size: self.out_size_y(),
                offset: self.min_y,
                binning: self.bin_y,
                reverse: self.reverse_y,
            },
        ]
    }

    fn is_full_frame(&self, max_size_x: usize, max_size_y: usize) -> bool {
        self.bin_x == 1
            && self.bin_y == 1
            && self.min_x == 0
            && self.min_y == 0
            && self.size_x == max_size_x
            && self.size_y == max_size_y
            && !self.reverse_x
            && !self.reverse_y
    }
}

fn clamp(name: &str, field: &mut i32, value: i32) {
    debug!("Correcting {} from {} to {}", name, *field, value);
    *field = value;
}

/// Force the geometry parameters into legal ranges, writing every correction
/// back to `params`
pub fn clamp_geometry(params: &mut AcquisitionParams) -> Geometry {
    let (max_x, max_y) = (params.max_size_x, params.max_size_y);

    if params.bin_x < 1 {
        clamp("BIN_X", &mut params.bin_x, 1);
    }
    if params.bin_y < 1 {
        clamp("BIN_Y", &mut params.bin_y, 1);
    }
    if params.min_x < 0 {
        clamp("MIN_X", &mut params.min_x, 0);
    }
    if params.min_y < 0 {
        clamp("MIN_Y", &mut params.min_y, 0);
    }
    if params.min_x > max_x - 1 {
        clamp("MIN_X", &mut params.min_x, max_x - 1);
    }
    if params.min_y > max_y - 1 {
        clamp("MIN_Y", &mut params.min_y, max_y - 1);
    }
    if params.min_x.saturating_add(params.size_x) > max_x {
        clamp("SIZE_X", &mut params.size_x, max_x - params.min_x);
    }
    if params.min_y.saturating_add(params.size_y) > max_y {
        clamp("SIZE_Y", &mut params.size_y, max_y - params.min_y);
    }
    if params.size_x < 1 {
        clamp("SIZE_X", &mut params.size_x, 1);
    }
    if params.size_y < 1 {
        clamp("SIZE_Y", &mut params.size_y, 1);
    }

    Geometry {
        bin_x: params.bin_x as usize,
        bin_y: params.bin_y as usize,
        min_x: params.min_x as usize,
        min_y: params.min_y as usize,
        size_x: params.size_x as usize,
        size_y: params.size_y as usize,
        reverse_x: params.reverse_x,
        reverse_y: params.reverse_y,
    }
}

/// Build, publish and return the next output frame.
///
/// An allocation failure aborts the build before synthesis. The raw image,
/// the current frame, the reset flag and the size parameters are left as
/// they were.
pub fn build_frame(
    params: &mut AcquisitionParams,
    buffers: &mut BufferManager,
    stamp: FrameStamp,
) -> Result<ArcFrame> {
    let geometry = clamp_geometry(params);
    let max_size_x = usize::try_from(params.max_size_x).unwrap_or(0);
    let max_size_y = usize::try_from(params.max_size_y).unwrap_or(0);
    let data_type = params.data_type;

    let required = max_size_x
        .checked_mul(max_size_y)
        .and_then(|n| n.checked_mul(data_type.sample_size()))
        .ok_or_else(|| {
            SimError::allocation(format!(
                "raw buffer size overflows for {}x{} {}",
                max_size_x, max_size_y, data_type
            ))
        })?;
    if let Err(e) = buffers.ensure_capacity(required) {
        error!("Error allocating raw buffer: {}", e);
        return Err(e);
    }

    // Leased before synthesis so a full pool leaves the raw image untouched
    let out_bytes = geometry.out_size_x() * geometry.out_size_y() * data_type.sample_size();
    let lease = match buffers.lease_next(out_bytes) {
        Ok(lease) => lease,
        Err(e) => {
            error!("Error allocating output frame: {}", e);
            return Err(e);
        }
    };

    compute_image(
        buffers.raw_mut(),
        data_type,
        max_size_x,
        max_size_y,
        &SynthParams::from_params(params),
    );

    let data = if geometry.is_full_frame(max_size_x, max_size_y) {
        buffers.raw()[..required].to_vec()
    } else {
        with_sample_type!(data_type, T => extract::<T>(buffers.raw(), max_size_x, &geometry))
    };

    let frame = ImageFrame::new(
        stamp.unique_id,
        stamp.timestamp,
        data_type,
        geometry.dims(),
        Bytes::from(data),
        Some(lease),
    )?;
    let frame = buffers.publish(frame);

    params.reset_image = false;
    params.image_size = i32::try_from(frame.total_bytes()).unwrap_or(i32::MAX);
    params.image_size_x = i32::try_from(frame.size_x()).unwrap_or(i32::MAX);
    params.image_size_y = i32::try_from(frame.size_y()).unwrap_or(i32::MAX);

    Ok(frame)
}

/// Copy the region of interest out of the raw buffer. Each output pixel is
/// the wrapping sum of the `bin_x * bin_y` raw pixels it covers.
fn extract<T: Sample>(raw: &[u8], max_size_x: usize, geometry: &Geometry) -> Vec<u8> {
    let (out_x, out_y) = (geometry.out_size_x(), geometry.out_size_y());
    let mut out = vec![0u8; out_x * out_y * T::SIZE];

    for oy in 0..out_y {
        let dest_y = if geometry.reverse_y { out_y - 1 - oy } else { oy };
        for ox in 0..out_x {
            let dest_x = if geometry.reverse_x { out_x - 1 - ox } else { ox };

            let mut sum = T::from_f64(0.0);
            for by in 0..geometry.bin_y {
                let row = geometry.min_y + oy * geometry.bin_y + by;
                for bx in 0..geometry.bin_x {
                    let col = geometry.min_x + ox * geometry.bin_x + bx;
                    sum = sum.accumulate(T::read_ne(&raw[(row * max_size_x + col) * T::SIZE..]));
                }
            }

            sum.write_ne(&mut out[(dest_y * out_x + dest_x) * T::SIZE..]);
        }
    }

    out
}
