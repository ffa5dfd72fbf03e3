use crate::annotate::AnnotationStyle;
use crate::detector::DetectorParams;
use crate::error::Error;
use crate::speed::{Calibration, SpeedZone};
use crate::tracker::TemplateTrackerConfig;

use serde_derive::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Run the detector on every n-th frame.
    pub interval: u64,
    pub params: DetectorParams,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval: 10,
            params: DetectorParams::default(),
        }
    }
}

/// Resolution every decoded frame is resized to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub calibration: Calibration,
    pub zone: SpeedZone,
    pub detection: DetectionConfig,
    pub video: VideoConfig,
    pub tracker: TemplateTrackerConfig,
    pub style: AnnotationStyle,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.calibration.validate()?;
        self.zone.validate()?;

        if self.detection.interval == 0 {
            return Err(Error::InvalidConfig(
                "detection interval must be at least 1".into(),
            ));
        }

        let scale_factor = self.detection.params.scale_factor;
        if scale_factor.is_nan() || scale_factor <= 1.0 {
            return Err(Error::InvalidConfig(format!(
                "detector scale factor must be greater than 1, got {}",
                self.detection.params.scale_factor
            )));
        }

        if self.video.width == 0 || self.video.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "frame resolution must be non-zero, got {}x{}",
                self.video.width, self.video.height
            )));
        }

        Ok(())
    }
}
