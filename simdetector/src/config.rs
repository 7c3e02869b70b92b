/*!
Configuration management for the simulated detector.
*/

use crate::params::{ImageMode, ParamId, ParamValue};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::DataType;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    pub acquisition: AcquisitionConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

/// Construction arguments of the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Sensor width in pixels
    pub max_size_x: usize,

    /// Sensor height in pixels
    pub max_size_y: usize,

    /// Initial pixel representation
    pub data_type: DataType,

    /// Maximum output frames alive at once (0 = unlimited)
    pub max_buffers: usize,

    /// Maximum bytes of output frames alive at once (0 = unlimited)
    pub max_memory: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_size_x: 1024,
            max_size_y: 1024,
            data_type: DataType::UInt8,
            max_buffers: 50,
            max_memory: 0,
        }
    }
}

/// Acquisition parameters applied after construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub image_mode: ImageMode,

    /// Frames per acquisition in `Multiple` mode
    pub num_images: i32,

    /// Exposure time in seconds
    pub acquire_time: f64,

    /// Time between frame starts in seconds
    pub acquire_period: f64,

    pub gain: f64,
    pub gain_x: f64,
    pub gain_y: f64,
    pub bin_x: i32,
    pub bin_y: i32,
    pub reverse_x: bool,
    pub reverse_y: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            image_mode: ImageMode::Continuous,
            num_images: 100,
            acquire_time: 0.001,
            acquire_period: 0.005,
            gain: 1.0,
            gain_x: 1.0,
            gain_y: 1.0,
            bin_x: 1,
            bin_y: 1,
            reverse_x: false,
            reverse_y: false,
        }
    }
}

impl AcquisitionConfig {
    /// Parameter writes that apply this section to a detector
    pub fn param_writes(&self) -> Vec<(&'static str, ParamValue)> {
        use ParamValue::{Float, Int};

        vec![
            (ParamId::NumImages.name(), Int(self.num_images)),
            (ParamId::ImageMode.name(), Int(self.image_mode.code())),
            (ParamId::AcquireTime.name(), Float(self.acquire_time)),
            (ParamId::AcquirePeriod.name(), Float(self.acquire_period)),
            (ParamId::Gain.name(), Float(self.gain)),
            (ParamId::GainX.name(), Float(self.gain_x)),
            (ParamId::GainY.name(), Float(self.gain_y)),
            (ParamId::BinX.name(), Int(self.bin_x)),
            (ParamId::BinY.name(), Int(self.bin_y)),
            (ParamId::ReverseX.name(), Int(i32::from(self.reverse_x))),
            (ParamId::ReverseY.name(), Int(i32::from(self.reverse_y))),
        ]
    }
}

/// Frame output settings for the command-line front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print one JSON summary per frame on stdout
    pub live_json: bool,

    /// Log a throughput line every N frames (0 = never)
    pub stats_interval_frames: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            live_json: false,
            stats_interval_frames: 100,
        }
    }
}
