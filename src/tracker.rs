use crate::bbox::BoundingBox;
use crate::error::Error;
use crate::frame::{Frame, GrayFrame};

use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};

/// Per-object visual tracker.
///
/// Every call gets the color frame together with its luma plane, converted
/// once per frame by the caller.
pub trait ObjectTracker {
    /// Seeds the tracker with `bbox` on `frame` and returns the box it adopted,
    /// which is what later updates are measured against.
    fn init(
        &mut self,
        frame: &Frame,
        gray: &GrayFrame,
        bbox: BoundingBox,
    ) -> Result<BoundingBox, Error>;

    /// Locates the object on `frame`. `Ok(None)` means the object was lost,
    /// errors are reserved for failures of the tracker itself.
    fn update(&mut self, frame: &Frame, gray: &GrayFrame) -> Result<Option<BoundingBox>, Error>;
}

impl<T: ObjectTracker + ?Sized> ObjectTracker for Box<T> {
    #[inline]
    fn init(
        &mut self,
        frame: &Frame,
        gray: &GrayFrame,
        bbox: BoundingBox,
    ) -> Result<BoundingBox, Error> {
        (**self).init(frame, gray, bbox)
    }

    #[inline]
    fn update(&mut self, frame: &Frame, gray: &GrayFrame) -> Result<Option<BoundingBox>, Error> {
        (**self).update(frame, gray)
    }
}

/// Builds a fresh, uninitialized tracker for every new track.
pub trait TrackerFactory {
    fn create(&mut self) -> Result<Box<dyn ObjectTracker>, Error>;
}

impl<F> TrackerFactory for F
where
    F: FnMut() -> Result<Box<dyn ObjectTracker>, Error>,
{
    #[inline]
    fn create(&mut self) -> Result<Box<dyn ObjectTracker>, Error> {
        self()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TemplateTrackerConfig {
    /// How far, in pixels, the object may move between two frames.
    pub search_radius: i32,
    /// Mean absolute luma difference above which the object counts as lost.
    pub max_mean_diff: f32,
}

impl Default for TemplateTrackerConfig {
    fn default() -> Self {
        Self {
            search_radius: 16,
            max_mean_diff: 40.0,
        }
    }
}

/// Exhaustive template matching over a square search window around the last
/// known position, scored by mean absolute difference of luma.
#[derive(Debug, Clone)]
pub struct TemplateTracker {
    config: TemplateTrackerConfig,
    template: Option<Array2<u8>>,
    rect_last: BoundingBox,
}

impl TemplateTracker {
    pub fn new(config: TemplateTrackerConfig) -> Self {
        Self {
            config,
            template: None,
            rect_last: BoundingBox::new(0, 0, 0, 0),
        }
    }

    pub fn factory(config: TemplateTrackerConfig) -> impl TrackerFactory {
        move || -> Result<Box<dyn ObjectTracker>, Error> {
            Ok(Box::new(TemplateTracker::new(config.clone())))
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.template.is_some()
    }

    #[inline]
    pub fn bbox(&self) -> BoundingBox {
        self.rect_last
    }

    fn mean_diff(template: &Array2<u8>, window: ArrayView2<'_, u8>) -> f32 {
        let sum: u64 = template
            .iter()
            .zip(window.iter())
            .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs() as u64)
            .sum();

        sum as f32 / template.len().max(1) as f32
    }
}

impl Default for TemplateTracker {
    fn default() -> Self {
        Self::new(TemplateTrackerConfig::default())
    }
}

impl ObjectTracker for TemplateTracker {
    /// Only the part of `bbox` inside the frame becomes the template, so the
    /// clipped box is the one reported back. A box entirely outside the frame
    /// is adopted as is and lost on the first update.
    fn init(
        &mut self,
        _frame: &Frame,
        gray: &GrayFrame,
        bbox: BoundingBox,
    ) -> Result<BoundingBox, Error> {
        let (fw, fh) = gray.dims();

        match bbox.clip(fw as i32, fh as i32) {
            Some(r) => {
                let ltrb = r.as_ltrb();
                let patch = gray.pixels.slice(s![
                    ltrb.top() as usize..ltrb.bottom() as usize,
                    ltrb.left() as usize..ltrb.right() as usize
                ]);

                self.rect_last = r;
                self.template = Some(patch.to_owned());
            }
            None => {
                self.rect_last = bbox;
                self.template = None;
            }
        }

        Ok(self.rect_last)
    }

    fn update(&mut self, _frame: &Frame, gray: &GrayFrame) -> Result<Option<BoundingBox>, Error> {
        let template = match &self.template {
            Some(t) => t,
            None => return Ok(None),
        };

        let (fw, fh) = gray.dims();
        let radius = self.config.search_radius.max(0);

        // (score, displacement, box)
        let mut best: Option<(f32, i32, BoundingBox)> = None;

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let candidate = self.rect_last.translate(dx, dy);
                let ltrb = candidate.as_ltrb();

                if ltrb.left() < 0
                    || ltrb.top() < 0
                    || ltrb.right() > fw as i32
                    || ltrb.bottom() > fh as i32
                {
                    continue;
                }

                let window = gray.pixels.slice(s![
                    ltrb.top() as usize..ltrb.bottom() as usize,
                    ltrb.left() as usize..ltrb.right() as usize
                ]);

                let score = Self::mean_diff(template, window);
                let displacement = dx.abs() + dy.abs();

                let better = match best {
                    None => true,
                    Some((s, d, _)) => score < s || (score == s && displacement < d),
                };

                if better {
                    best = Some((score, displacement, candidate));
                }
            }
        }

        match best {
            Some((score, _, bbox)) if score <= self.config.max_mean_diff => {
                self.rect_last = bbox;
                Ok(Some(bbox))
            }
            _ => Ok(None),
        }
    }
}
