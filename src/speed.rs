use crate::bbox::BoundingBox;
use crate::error::Error;

use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

const MPS_TO_KMH: f32 = 3.6;

/// Fixed camera calibration supplied by the operator.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Calibration {
    pub pixels_per_meter: f32,
    pub frames_per_second: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            pixels_per_meter: 8.8,
            frames_per_second: 18.0,
        }
    }
}

impl Calibration {
    pub fn new(pixels_per_meter: f32, frames_per_second: f32) -> Result<Self, Error> {
        let calibration = Self {
            pixels_per_meter,
            frames_per_second,
        };
        calibration.validate()?;

        Ok(calibration)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.pixels_per_meter.is_finite() || self.pixels_per_meter <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "pixels_per_meter must be a positive number, got {}",
                self.pixels_per_meter
            )));
        }

        if !self.frames_per_second.is_finite() || self.frames_per_second <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "frames_per_second must be a positive number, got {}",
                self.frames_per_second
            )));
        }

        Ok(())
    }
}

/// Speed in km/h implied by moving from `prev` to `curr` in one frame.
///
/// Only the top-left corners take part, box sizes are ignored.
pub fn estimate_speed(prev: &BoundingBox, curr: &BoundingBox, calibration: &Calibration) -> f32 {
    let d_pixels = na::distance(&prev.top_left(), &curr.top_left());
    let d_meters = d_pixels / calibration.pixels_per_meter;

    d_meters * calibration.frames_per_second * MPS_TO_KMH
}

/// Pixel rows where speed gets sampled, and the row past which labels are shown.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct SpeedZone {
    pub band_low: i32,
    pub band_high: i32,
    pub display_threshold: i32,
}

impl Default for SpeedZone {
    fn default() -> Self {
        Self {
            band_low: 275,
            band_high: 285,
            display_threshold: 180,
        }
    }
}

impl SpeedZone {
    pub fn validate(&self) -> Result<(), Error> {
        if self.band_low > self.band_high {
            return Err(Error::InvalidConfig(format!(
                "calibration band is empty: [{}, {}]",
                self.band_low, self.band_high
            )));
        }

        Ok(())
    }

    #[inline]
    pub fn in_band(&self, y: i32) -> bool {
        self.band_low <= y && y <= self.band_high
    }

    #[inline]
    pub fn displayable(&self, y: i32) -> bool {
        y >= self.display_threshold
    }

    /// Zone-gated, write-once sampling.
    ///
    /// Returns the speed to record for a track whose box went from `prev` to
    /// `curr` this frame, or `None` when nothing should be written: the box did
    /// not move, a speed is already on record, or `prev.y` lies outside the band.
    pub fn sample(
        &self,
        prev: &BoundingBox,
        curr: &BoundingBox,
        recorded: Option<f32>,
        calibration: &Calibration,
    ) -> Option<f32> {
        if prev == curr || recorded.is_some() || !self.in_band(prev.y()) {
            return None;
        }

        Some(estimate_speed(prev, curr, calibration))
    }
}
