/*!
Pixel numeric representations.

This module provides the closed set of numeric representations a detector can
synthesize, and the per-representation conversion rules used by the synthesis
and binning code. Integer representations wrap on overflow; floating
representations follow standard rounding.
*/

use num_traits::{AsPrimitive, WrappingAdd};
use serde::{Deserialize, Serialize};

/// Numeric representation of one pixel sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum DataType {
    Int8 = 0,
    UInt8 = 1,
    Int16 = 2,
    UInt16 = 3,
    Int32 = 4,
    UInt32 = 5,
    Float32 = 6,
    Float64 = 7,
}

impl DataType {
    /// Every supported representation, in code order
    pub const ALL: [DataType; 8] = [
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Float32,
        Self::Float64,
    ];

    /// Parse a representation from its integer parameter code
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(code).ok()?).copied()
    }

    /// Integer parameter code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Size of one sample in bytes
    pub fn sample_size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Short display name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int8 => "Int8",
            Self::UInt8 => "UInt8",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataType {
    type Err = crate::SimError;

    /// Parse a representation name, ignoring case
    fn from_str(s: &str) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|data_type| data_type.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::SimError::invalid_value("DataType", s))
    }
}

/// A fixed-width pixel sample stored in native byte order
pub trait Sample: Copy + PartialOrd + AsPrimitive<f64> + Send + Sync + 'static {
    /// Representation tag for this sample type
    const DATA_TYPE: DataType;

    /// Bytes per sample
    const SIZE: usize = std::mem::size_of::<Self>();

    /// Convert with fixed-width truncation (integers wrap, never saturate)
    fn from_f64(value: f64) -> Self;

    /// Add `inc`, wrapping for integer representations
    fn accumulate(self, inc: Self) -> Self;

    /// Read one sample from the start of `bytes`
    fn read_ne(bytes: &[u8]) -> Self;

    /// Write this sample to the start of `bytes`
    fn write_ne(self, bytes: &mut [u8]);
}

macro_rules! impl_int_sample {
    ($($t:ty => $kind:ident),* $(,)?) => {$(
        impl Sample for $t {
            const DATA_TYPE: DataType = DataType::$kind;

            fn from_f64(value: f64) -> Self {
                // Through i64 so out-of-range values wrap to the target width.
                (value as i64) as $t
            }

            fn accumulate(self, inc: Self) -> Self {
                WrappingAdd::wrapping_add(&self, &inc)
            }

            fn read_ne(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_ne_bytes(buf)
            }

            fn write_ne(self, bytes: &mut [u8]) {
                bytes[..std::mem::size_of::<$t>()].copy_from_slice(&self.to_ne_bytes());
            }
        }
    )*};
}

macro_rules! impl_float_sample {
    ($($t:ty => $kind:ident),* $(,)?) => {$(
        impl Sample for $t {
            const DATA_TYPE: DataType = DataType::$kind;

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn accumulate(self, inc: Self) -> Self {
                self + inc
            }

            fn read_ne(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_ne_bytes(buf)
            }

            fn write_ne(self, bytes: &mut [u8]) {
                bytes[..std::mem::size_of::<$t>()].copy_from_slice(&self.to_ne_bytes());
            }
        }
    )*};
}

impl_int_sample!(
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
);

impl_float_sample!(f32 => Float32, f64 => Float64);

/// Run `$body` with `$T` bound to the sample type for a [`DataType`].
///
/// ```
/// use shared::{with_sample_type, DataType, Sample};
/// let size = with_sample_type!(DataType::Int16, T => T::SIZE);
/// assert_eq!(size, 2);
/// ```
#[macro_export]
macro_rules! with_sample_type {
    ($data_type:expr, $T:ident => $body:expr) => {
        match $data_type {
            $crate::DataType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::DataType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::DataType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::DataType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::DataType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::DataType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::DataType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::DataType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}
