//! Application configuration loaded from an optional YAML file.
//!
//! Every field is optional in the file. Values given on the command line take precedence over the
//! file, which takes precedence over the defaults.

use crate::capture::CaptureConfig;
use crate::hand::DetectorConfig;
use crate::output::WindowConfig;
use crate::proximity::DEFAULT_PROXIMITY_THRESHOLD;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CaptureConfig,
    pub detector: DetectorConfig,
    pub window: WindowConfig,
    /// Wrist distance in pixels below which two hands count as close
    pub proximity_threshold: f32,
    /// Time to wait for key input after each frame, in milliseconds
    pub wait_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CaptureConfig::default(),
            detector: DetectorConfig::default(),
            window: WindowConfig::default(),
            proximity_threshold: DEFAULT_PROXIMITY_THRESHOLD,
            wait_ms: 5,
        }
    }
}

/// Settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub device_index: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub model_dir: Option<PathBuf>,
    pub proximity_threshold: Option<f32>,
}

impl Config {
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content, path)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Loads the file if one is given, applies the overrides, and validates the result.
    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(index) = overrides.device_index {
            self.camera.device_index = index;
        }
        if let Some(width) = overrides.width {
            self.camera.width = width;
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.camera.height = height;
            self.window.height = height;
        }
        if let Some(dir) = &overrides.model_dir {
            self.detector.set_model_dir(dir);
        }
        if let Some(threshold) = overrides.proximity_threshold {
            self.proximity_threshold = threshold;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.proximity_threshold > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "proximity_threshold must be positive, got {}",
                self.proximity_threshold
            )));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera resolution must be non-zero, got {}x{}",
                self.camera.width, self.camera.height
            )));
        }
        if self.detector.max_num_hands == 0 {
            return Err(ConfigError::Invalid(
                "detector.max_num_hands must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("min_detection_confidence", self.detector.min_detection_confidence),
            ("min_tracking_confidence", self.detector.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "detector.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
