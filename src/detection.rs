use serde_derive::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// One recorded detection: (x,y) of the center and (width,height) of the box.
///
/// This is the record format of detection dumps, one JSON array per frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(rename = "p", default = "full_confidence")]
    pub confidence: f32,
    #[serde(rename = "c", default)]
    pub class: i32,
}

fn full_confidence() -> f32 {
    1.0
}

impl Detection {
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Self {
            x: bbox.x() as f32 + bbox.width() as f32 / 2.,
            y: bbox.y() as f32 + bbox.height() as f32 / 2.,
            w: bbox.width() as f32,
            h: bbox.height() as f32,
            confidence: 1.0,
            class: 0,
        }
    }

    #[inline(always)]
    pub fn xmin(&self) -> f32 {
        self.x - self.w / 2.
    }

    #[inline(always)]
    pub fn ymin(&self) -> f32 {
        self.y - self.h / 2.
    }

    #[inline(always)]
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_ltwh(self.xmin(), self.ymin(), self.w, self.h)
    }
}
