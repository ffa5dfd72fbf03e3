use crate::bbox::BoundingBox;
use crate::error::Error;
use crate::frame::{Frame, GrayFrame};
use crate::speed::{Calibration, SpeedZone};
use crate::track::Track;
use crate::tracker::TrackerFactory;

use tracing::debug;

/// What one track did on one frame. Only produced for successful updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackUpdate {
    pub track_id: u64,
    /// Entry state of the track on this frame.
    pub box_prev: BoundingBox,
    pub box_curr: BoundingBox,
    pub speed: Option<f32>,
    /// Whether the speed was sampled on this very frame.
    pub sampled: bool,
}

impl TrackUpdate {
    #[inline]
    pub fn moved(&self) -> bool {
        self.box_prev != self.box_curr
    }
}

/// Registry of live tracks for one feed.
///
/// The registry is replaced wholesale on every detection cycle and mutated in
/// place by tracker updates in between. Ids keep increasing across rebuilds and
/// are never handed out twice.
pub struct Scene {
    pub tracks: Vec<Track>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            tracks: Vec::with_capacity(64),
            next_id: 0,
        }
    }

    /// Drops every live track and starts one per box, in the order given, each
    /// with a fresh tracker seeded on `frame`. A track starts from the box its
    /// tracker adopted, not the raw detection. Returns the number of tracks.
    pub fn rebuild(
        &mut self,
        frame: &Frame,
        gray: &GrayFrame,
        boxes: &[BoundingBox],
        factory: &mut dyn TrackerFactory,
    ) -> Result<usize, Error> {
        self.tracks.clear();

        for bbox in boxes {
            let mut tracker = factory.create()?;
            let seeded = tracker.init(frame, gray, *bbox)?;

            let id = self.next_id;
            self.next_id += 1;

            self.tracks.push(Track::new(id, tracker, seeded));
        }

        debug!(
            frame = frame.index,
            tracks = self.tracks.len(),
            "registry rebuilt"
        );

        Ok(self.tracks.len())
    }

    /// Advances every live track by one frame and samples speeds.
    ///
    /// Tracks whose tracker loses the object are marked lost and left alone
    /// until the next rebuild discards them.
    pub fn update(
        &mut self,
        frame: &Frame,
        gray: &GrayFrame,
        zone: &SpeedZone,
        calibration: &Calibration,
    ) -> Result<Vec<TrackUpdate>, Error> {
        let mut updates = Vec::with_capacity(self.tracks.len());

        for t in self.tracks.iter_mut().filter(|t| !t.lost) {
            let bbox = match t.tracker.update(frame, gray)? {
                Some(bbox) => bbox,
                None => {
                    debug!(frame = frame.index, track = t.track_id, "track lost");
                    t.lost = true;
                    continue;
                }
            };

            t.advance(bbox);

            let mut sampled = false;
            if let Some(speed) = zone.sample(&t.box_prev, &t.box_curr, t.speed(), calibration) {
                sampled = t.record_speed(speed);

                debug!(
                    frame = frame.index,
                    track = t.track_id,
                    speed,
                    "speed sampled"
                );
            }

            updates.push(TrackUpdate {
                track_id: t.track_id,
                box_prev: t.box_prev,
                box_curr: t.box_curr,
                speed: t.speed(),
                sampled,
            });
        }

        Ok(updates)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[inline]
    pub fn get(&self, track_id: u64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    #[inline]
    pub fn ids(&self) -> Vec<u64> {
        self.tracks.iter().map(|t| t.track_id).collect()
    }

    /// Id the next created track will get.
    #[inline]
    pub fn next_id(&self) -> u64 {
        self.next_id
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ObjectTracker;

    /// Moves its box by a fixed step on every update, loses it after `lifetime` updates.
    struct Drift {
        bbox: BoundingBox,
        step: (i32, i32),
        lifetime: u32,
    }

    impl ObjectTracker for Drift {
        fn init(
            &mut self,
            _frame: &Frame,
            _gray: &GrayFrame,
            bbox: BoundingBox,
        ) -> Result<BoundingBox, Error> {
            // keeps only a 10px wide strip, like a tracker clipping to the frame
            self.bbox = BoundingBox::new(bbox.x(), bbox.y(), bbox.width().min(10), bbox.height());
            Ok(self.bbox)
        }

        fn update(
            &mut self,
            _frame: &Frame,
            _gray: &GrayFrame,
        ) -> Result<Option<BoundingBox>, Error> {
            if self.lifetime == 0 {
                return Ok(None);
            }

            self.lifetime -= 1;
            self.bbox = self.bbox.translate(self.step.0, self.step.1);
            Ok(Some(self.bbox))
        }
    }

    fn drift(step: (i32, i32), lifetime: u32) -> impl TrackerFactory {
        move || -> Result<Box<dyn ObjectTracker>, Error> {
            Ok(Box::new(Drift {
                bbox: BoundingBox::new(0, 0, 0, 0),
                step,
                lifetime,
            }))
        }
    }

    #[test]
    fn test_rebuild_replaces_and_never_reuses_ids() {
        let frame = Frame::blank(10, 64, 48);
        let gray = frame.gray();
        let mut factory = drift((1, 1), 100);
        let mut scene = Scene::new();

        let boxes = [BoundingBox::new(1, 1, 5, 5), BoundingBox::new(20, 20, 5, 5)];
        assert_eq!(scene.rebuild(&frame, &gray, &boxes, &mut factory).unwrap(), 2);
        assert_eq!(scene.ids(), vec![0, 1]);

        assert_eq!(scene.rebuild(&frame, &gray, &boxes[..1], &mut factory).unwrap(), 1);
        assert_eq!(scene.ids(), vec![2]);

        assert_eq!(scene.rebuild(&frame, &gray, &[], &mut factory).unwrap(), 0);
        assert!(scene.is_empty());
        assert_eq!(scene.next_id(), 3);
    }

    #[test]
    fn test_update_tracks_prev_and_curr() {
        let frame = Frame::blank(10, 64, 48);
        let gray = frame.gray();
        let mut factory = drift((2, 3), 100);
        let mut scene = Scene::new();
        let start = BoundingBox::new(1, 1, 5, 5);
        scene.rebuild(&frame, &gray, &[start], &mut factory).unwrap();

        let zone = SpeedZone::default();
        let calibration = Calibration::default();

        let ups = scene.update(&frame, &gray, &zone, &calibration).unwrap();
        assert_eq!(ups[0].box_prev, start);
        assert_eq!(ups[0].box_curr, start.translate(2, 3));

        let ups = scene.update(&frame, &gray, &zone, &calibration).unwrap();
        assert_eq!(ups[0].box_prev, start.translate(2, 3));
        assert_eq!(ups[0].box_curr, start.translate(4, 6));
        assert_eq!(ups[0].speed, None);
    }

    #[test]
    fn test_lost_track_goes_inert() {
        let frame = Frame::blank(10, 64, 48);
        let gray = frame.gray();
        let mut factory = drift((1, 0), 1);
        let mut scene = Scene::new();
        scene
            .rebuild(&frame, &gray, &[BoundingBox::new(1, 1, 5, 5)], &mut factory)
            .unwrap();

        let zone = SpeedZone::default();
        let calibration = Calibration::default();

        assert_eq!(scene.update(&frame, &gray, &zone, &calibration).unwrap().len(), 1);
        assert!(scene.update(&frame, &gray, &zone, &calibration).unwrap().is_empty());
        assert!(scene.update(&frame, &gray, &zone, &calibration).unwrap().is_empty());

        // still registered until the next rebuild
        assert_eq!(scene.len(), 1);
        assert!(scene.get(0).map(|t| t.lost).unwrap_or(false));
    }

    #[test]
    fn test_speed_sampled_once_in_band() {
        let frame = Frame::blank(10, 640, 480);
        let gray = frame.gray();
        let mut factory = drift((0, 3), 100);
        let mut scene = Scene::new();
        scene
            .rebuild(&frame, &gray, &[BoundingBox::new(50, 270, 20, 20)], &mut factory)
            .unwrap();

        let zone = SpeedZone::default();
        let calibration = Calibration::default();

        let mut samples = 0;
        let mut first = None;
        for _ in 0..10 {
            let ups = scene.update(&frame, &gray, &zone, &calibration).unwrap();
            if ups[0].sampled {
                samples += 1;
                first.get_or_insert(ups[0].box_prev.y());
            }
        }

        assert_eq!(samples, 1);
        // entry rows go 270, 273, 276, ...
        assert_eq!(first, Some(276));
        assert!(scene.get(0).and_then(|t| t.speed()).is_some());
    }

    #[test]
    fn test_track_starts_from_the_adopted_box() {
        let frame = Frame::blank(10, 64, 48);
        let gray = frame.gray();
        let mut factory = drift((0, 0), 100);
        let mut scene = Scene::new();
        scene
            .rebuild(&frame, &gray, &[BoundingBox::new(1, 1, 30, 5)], &mut factory)
            .unwrap();

        let track = scene.get(0).unwrap();
        assert_eq!(track.box_curr, BoundingBox::new(1, 1, 10, 5));
        assert_eq!(track.box_prev, track.box_curr);

        // nothing moved, so nothing is reported as motion
        let ups = scene
            .update(&frame, &gray, &SpeedZone::default(), &Calibration::default())
            .unwrap();
        assert!(!ups[0].moved());
    }
}
