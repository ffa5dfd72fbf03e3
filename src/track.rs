use crate::bbox::BoundingBox;
use crate::tracker::ObjectTracker;

use std::fmt;

pub struct Track {
    pub track_id: u64,
    pub tracker: Box<dyn ObjectTracker>,

    // box from the previous successful update (the detection box before the first one)
    pub box_prev: BoundingBox,
    pub box_curr: BoundingBox,

    // set once the tracker reported the object lost, never cleared
    pub lost: bool,

    // km/h, write-once
    speed: Option<f32>,
}

impl Track {
    pub fn new(track_id: u64, tracker: Box<dyn ObjectTracker>, bbox: BoundingBox) -> Self {
        Self {
            track_id,
            tracker,
            box_prev: bbox,
            box_curr: bbox,
            lost: false,
            speed: None,
        }
    }

    #[inline]
    pub fn speed(&self) -> Option<f32> {
        self.speed
    }

    /// Stores the speed unless one is already on record. Returns whether it was stored.
    pub fn record_speed(&mut self, speed: f32) -> bool {
        if self.speed.is_some() {
            return false;
        }

        self.speed = Some(speed);
        true
    }

    /// Shifts the current box into `box_prev` and takes `bbox` as the current one.
    #[inline]
    pub fn advance(&mut self, bbox: BoundingBox) {
        self.box_prev = self.box_curr;
        self.box_curr = bbox;
    }

    #[inline]
    pub fn moved(&self) -> bool {
        self.box_prev != self.box_curr
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("track_id", &self.track_id)
            .field("box_prev", &self.box_prev)
            .field("box_curr", &self.box_curr)
            .field("lost", &self.lost)
            .field("speed", &self.speed)
            .finish()
    }
}
