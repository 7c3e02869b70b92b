/*!
Acquisition parameters.

All detector state visible to clients lives in [`AcquisitionParams`], a plain
struct with one named field per parameter. External access goes through
[`ParamId`], a static name table that maps each parameter's stable name to its
field, value type and access rights.
*/

use serde::{Deserialize, Serialize};
use shared::{DataType, Result, SimError};

/// How many frames one acquisition produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ImageMode {
    Single = 0,
    Multiple = 1,
    Continuous = 2,
}

impl ImageMode {
    /// Parse a mode from its integer parameter code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Single),
            1 => Some(Self::Multiple),
            2 => Some(Self::Continuous),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Initial countdown for an acquisition in this mode; -1 never runs out
    pub fn images_remaining(self, num_images: i32) -> i32 {
        match self {
            Self::Single => 1,
            Self::Multiple => num_images,
            Self::Continuous => -1,
        }
    }
}

impl std::str::FromStr for ImageMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multiple" => Ok(Self::Multiple),
            "continuous" => Ok(Self::Continuous),
            _ => Err(SimError::invalid_value("ImageMode", s)),
        }
    }
}

/// Acquisition lifecycle state, published as the status parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum AcquisitionState {
    Idle = 0,
    Exposing = 1,
    Readout = 2,
}

impl AcquisitionState {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Idle),
            1 => Some(Self::Exposing),
            2 => Some(Self::Readout),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Status label as clients see it
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Exposing => "Acquire",
            Self::Readout => "Readout",
        }
    }
}

/// Value type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Text,
}

impl ParamKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Int => "integer",
            Self::Float => "float",
            Self::Text => "string",
        }
    }

    /// Parse a command-line string as a value of this kind
    pub fn parse(self, text: &str) -> Option<ParamValue> {
        match self {
            Self::Int => text.parse().ok().map(ParamValue::Int),
            Self::Float => text.parse().ok().map(ParamValue::Float),
            Self::Text => Some(ParamValue::Text(text.to_string())),
        }
    }
}

/// A parameter value as read or written by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i32),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Int(_) => ParamKind::Int,
            Self::Float(_) => ParamKind::Float,
            Self::Text(_) => ParamKind::Text,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Notification that a parameter changed value
#[derive(Debug, Clone, PartialEq)]
pub struct ParamUpdate {
    pub id: ParamId,
    pub value: ParamValue,
}

/// Identifier of every detector parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamId {
    Manufacturer,
    Model,
    MaxSizeX,
    MaxSizeY,
    BinX,
    BinY,
    MinX,
    MinY,
    SizeX,
    SizeY,
    ReverseX,
    ReverseY,
    DataType,
    ImageMode,
    NumImages,
    AcquireTime,
    AcquirePeriod,
    Gain,
    GainX,
    GainY,
    Acquire,
    ResetImage,
    ImageSize,
    ImageSizeX,
    ImageSizeY,
    ImageCounter,
    Status,
}

impl ParamId {
    /// Every parameter, in table order
    pub const ALL: [ParamId; 27] = [
        Self::Manufacturer,
        Self::Model,
        Self::MaxSizeX,
        Self::MaxSizeY,
        Self::BinX,
        Self::BinY,
        Self::MinX,
        Self::MinY,
        Self::SizeX,
        Self::SizeY,
        Self::ReverseX,
        Self::ReverseY,
        Self::DataType,
        Self::ImageMode,
        Self::NumImages,
        Self::AcquireTime,
        Self::AcquirePeriod,
        Self::Gain,
        Self::GainX,
        Self::GainY,
        Self::Acquire,
        Self::ResetImage,
        Self::ImageSize,
        Self::ImageSizeX,
        Self::ImageSizeY,
        Self::ImageCounter,
        Self::Status,
    ];

    /// Stable external name
    pub fn name(self) -> &'static str {
        match self {
            Self::Manufacturer => "MANUFACTURER",
            Self::Model => "MODEL",
            Self::MaxSizeX => "MAX_SIZE_X",
            Self::MaxSizeY => "MAX_SIZE_Y",
            Self::BinX => "BIN_X",
            Self::BinY => "BIN_Y",
            Self::MinX => "MIN_X",
            Self::MinY => "MIN_Y",
            Self::SizeX => "SIZE_X",
            Self::SizeY => "SIZE_Y",
            Self::ReverseX => "REVERSE_X",
            Self::ReverseY => "REVERSE_Y",
            Self::DataType => "DATA_TYPE",
            Self::ImageMode => "IMAGE_MODE",
            Self::NumImages => "NIMAGES",
            Self::AcquireTime => "ACQ_TIME",
            Self::AcquirePeriod => "ACQ_PERIOD",
            Self::Gain => "GAIN",
            Self::GainX => "SIM_GAINX",
            Self::GainY => "SIM_GAINY",
            Self::Acquire => "ACQUIRE",
            Self::ResetImage => "RESET_IMAGE",
            Self::ImageSize => "IMAGE_SIZE",
            Self::ImageSizeX => "IMAGE_SIZE_X",
            Self::ImageSizeY => "IMAGE_SIZE_Y",
            Self::ImageCounter => "IMAGE_COUNTER",
            Self::Status => "STATUS",
        }
    }

    /// Look up a parameter by its external name (case-insensitive)
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| SimError::UnknownParam(name.to_string()))
    }

    pub fn kind(self) -> ParamKind {
        match self {
            Self::Manufacturer | Self::Model => ParamKind::Text,
            Self::AcquireTime | Self::AcquirePeriod | Self::Gain | Self::GainX | Self::GainY => {
                ParamKind::Float
            }
            _ => ParamKind::Int,
        }
    }

    /// Outputs and construction-time constants
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::Manufacturer
                | Self::Model
                | Self::MaxSizeX
                | Self::MaxSizeY
                | Self::ImageSize
                | Self::ImageSizeX
                | Self::ImageSizeY
                | Self::ImageCounter
                | Self::Status
        )
    }

    /// Changing this parameter invalidates the accumulated raw image
    pub fn resets_image(self) -> bool {
        matches!(
            self,
            Self::BinX
                | Self::BinY
                | Self::MinX
                | Self::MinY
                | Self::SizeX
                | Self::SizeY
                | Self::DataType
                | Self::AcquireTime
                | Self::Gain
                | Self::GainX
                | Self::GainY
        )
    }
}

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every acquisition parameter, guarded by the detector lock
#[derive(Debug, Clone)]
pub struct AcquisitionParams {
    pub manufacturer: String,
    pub model: String,
    pub max_size_x: i32,
    pub max_size_y: i32,
    pub bin_x: i32,
    pub bin_y: i32,
    pub min_x: i32,
    pub min_y: i32,
    pub size_x: i32,
    pub size_y: i32,
    pub reverse_x: bool,
    pub reverse_y: bool,
    pub data_type: DataType,
    pub image_mode: ImageMode,
    pub num_images: i32,
    pub acquire_time: f64,
    pub acquire_period: f64,
    pub gain: f64,
    pub gain_x: f64,
    pub gain_y: f64,
    pub acquire: bool,
    pub reset_image: bool,
    pub image_size: i32,
    pub image_size_x: i32,
    pub image_size_y: i32,
    pub image_counter: i32,
    pub status: AcquisitionState,
}

impl AcquisitionParams {
    /// Default parameters for a detector of the given maximum geometry
    pub fn new(max_size_x: i32, max_size_y: i32, data_type: DataType) -> Self {
        Self {
            manufacturer: "Simulated detector".to_string(),
            model: "Basic simulator".to_string(),
            max_size_x,
            max_size_y,
            bin_x: 1,
            bin_y: 1,
            min_x: 0,
            min_y: 0,
            size_x: max_size_x,
            size_y: max_size_y,
            reverse_x: false,
            reverse_y: false,
            data_type,
            image_mode: ImageMode::Continuous,
            num_images: 100,
            acquire_time: 0.001,
            acquire_period: 0.005,
            gain: 1.0,
            gain_x: 1.0,
            gain_y: 1.0,
            acquire: false,
            reset_image: true,
            image_size: 0,
            image_size_x: max_size_x,
            image_size_y: max_size_y,
            image_counter: 0,
            status: AcquisitionState::Idle,
        }
    }

    /// Current value of one parameter
    pub fn get(&self, id: ParamId) -> ParamValue {
        use ParamValue::{Float, Int, Text};

        match id {
            ParamId::Manufacturer => Text(self.manufacturer.clone()),
            ParamId::Model => Text(self.model.clone()),
            ParamId::MaxSizeX => Int(self.max_size_x),
            ParamId::MaxSizeY => Int(self.max_size_y),
            ParamId::BinX => Int(self.bin_x),
            ParamId::BinY => Int(self.bin_y),
            ParamId::MinX => Int(self.min_x),
            ParamId::MinY => Int(self.min_y),
            ParamId::SizeX => Int(self.size_x),
            ParamId::SizeY => Int(self.size_y),
            ParamId::ReverseX => Int(i32::from(self.reverse_x)),
            ParamId::ReverseY => Int(i32::from(self.reverse_y)),
            ParamId::DataType => Int(self.data_type.code()),
            ParamId::ImageMode => Int(self.image_mode.code()),
            ParamId::NumImages => Int(self.num_images),
            ParamId::AcquireTime => Float(self.acquire_time),
            ParamId::AcquirePeriod => Float(self.acquire_period),
            ParamId::Gain => Float(self.gain),
            ParamId::GainX => Float(self.gain_x),
            ParamId::GainY => Float(self.gain_y),
            ParamId::Acquire => Int(i32::from(self.acquire)),
            ParamId::ResetImage => Int(i32::from(self.reset_image)),
            ParamId::ImageSize => Int(self.image_size),
            ParamId::ImageSizeX => Int(self.image_size_x),
            ParamId::ImageSizeY => Int(self.image_size_y),
            ParamId::ImageCounter => Int(self.image_counter),
            ParamId::Status => Int(self.status.code()),
        }
    }

    /// Store a client-written value, rejecting read-only parameters, wrong
    /// value types and out-of-range enumerations
    pub fn store(&mut self, id: ParamId, value: &ParamValue) -> Result<()> {
        if id.is_read_only() {
            return Err(SimError::ReadOnly(id.name()));
        }
        if value.kind() != id.kind() {
            return Err(SimError::WrongType {
                param: id.name(),
                expected: id.kind().as_str(),
            });
        }

        match (id, value) {
            (ParamId::BinX, ParamValue::Int(v)) => self.bin_x = *v,
            (ParamId::BinY, ParamValue::Int(v)) => self.bin_y = *v,
            (ParamId::MinX, ParamValue::Int(v)) => self.min_x = *v,
            (ParamId::MinY, ParamValue::Int(v)) => self.min_y = *v,
            (ParamId::SizeX, ParamValue::Int(v)) => self.size_x = *v,
            (ParamId::SizeY, ParamValue::Int(v)) => self.size_y = *v,
            (ParamId::ReverseX, ParamValue::Int(v)) => self.reverse_x = *v != 0,
            (ParamId::ReverseY, ParamValue::Int(v)) => self.reverse_y = *v != 0,
            (ParamId::DataType, ParamValue::Int(v)) => {
                self.data_type =
                    DataType::from_code(*v).ok_or_else(|| SimError::invalid_value(id.name(), v))?;
            }
            (ParamId::ImageMode, ParamValue::Int(v)) => {
                self.image_mode =
                    ImageMode::from_code(*v).ok_or_else(|| SimError::invalid_value(id.name(), v))?;
            }
            (ParamId::NumImages, ParamValue::Int(v)) => self.num_images = *v,
            (ParamId::AcquireTime, ParamValue::Float(v)) => self.acquire_time = *v,
            (ParamId::AcquirePeriod, ParamValue::Float(v)) => self.acquire_period = *v,
            (ParamId::Gain, ParamValue::Float(v)) => self.gain = *v,
            (ParamId::GainX, ParamValue::Float(v)) => self.gain_x = *v,
            (ParamId::GainY, ParamValue::Float(v)) => self.gain_y = *v,
            (ParamId::Acquire, ParamValue::Int(v)) => self.acquire = *v != 0,
            (ParamId::ResetImage, ParamValue::Int(v)) => self.reset_image = *v != 0,
            // Kind and access were checked above
            _ => return Err(SimError::ReadOnly(id.name())),
        }
        Ok(())
    }

    /// Snapshot of every parameter value, in [`ParamId::ALL`] order
    pub fn snapshot(&self) -> Vec<ParamValue> {
        ParamId::ALL.iter().map(|id| self.get(*id)).collect()
    }
}
