/*!
Numeric pixel synthesis.

The raw image is a deterministic gradient: pixel (row `i`, column `j`) is
`j * gainX + i * gainY + inc`, with `inc = gain * exposureTime * 1000`. A reset
rewrites the gradient; otherwise every sample grows by `inc`, simulating
continued integration.
*/

use crate::params::AcquisitionParams;
use num_traits::AsPrimitive;
use shared::{with_sample_type, DataType, Sample};

/// Inputs of one synthesis pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthParams {
    pub gain: f64,
    pub gain_x: f64,
    pub gain_y: f64,
    pub exposure_time: f64,
    pub reset: bool,
}

impl SynthParams {
    pub fn from_params(params: &AcquisitionParams) -> Self {
        Self {
            gain: params.gain,
            gain_x: params.gain_x,
            gain_y: params.gain_y,
            exposure_time: params.acquire_time,
            reset: params.reset_image,
        }
    }
}

/// Overwrite or accumulate into a row-major `max_size_y` x `max_size_x` raw
/// buffer holding samples of `data_type`
pub fn compute_image(
    raw: &mut [u8],
    data_type: DataType,
    max_size_x: usize,
    max_size_y: usize,
    params: &SynthParams,
) {
    with_sample_type!(data_type, T => compute_array::<T>(raw, max_size_x, max_size_y, params))
}

fn compute_array<T: Sample>(raw: &mut [u8], max_size_x: usize, max_size_y: usize, params: &SynthParams) {
    if max_size_x == 0 {
        return;
    }

    let inc = T::from_f64(params.gain * params.exposure_time * 1000.0);
    let samples = raw.chunks_exact_mut(T::SIZE).take(max_size_x * max_size_y);

    if params.reset {
        let offset: f64 = inc.as_();
        for (n, chunk) in samples.enumerate() {
            let (i, j) = (n / max_size_x, n % max_size_x);
            let value = j as f64 * params.gain_x + i as f64 * params.gain_y + offset;
            T::from_f64(value).write_ne(chunk);
        }
    } else {
        for chunk in samples {
            T::read_ne(chunk).accumulate(inc).write_ne(chunk);
        }
    }
}
