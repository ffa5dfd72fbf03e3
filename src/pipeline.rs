use crate::annotate::{Annotation, Annotator};
use crate::config::Config;
use crate::detector::{Detect, DetectorParams};
use crate::error::Error;
use crate::frame::Frame;
use crate::scene::Scene;
use crate::speed::{Calibration, SpeedZone};
use crate::tracker::TrackerFactory;

use serde_derive::Serialize;
use tracing::debug;

/// Output of one processed frame.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub index: u64,
    pub image: Frame,
    pub annotations: Vec<Annotation>,
    /// Whether this frame started a detection cycle.
    pub detected: bool,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub detection_cycles: u64,
    pub tracks_created: u64,
    pub tracks_lost: u64,
    pub speeds_measured: u64,
}

/// Detection-cycle controller and per-frame track update for a single feed.
pub struct SpeedPipeline {
    interval: u64,
    params: DetectorParams,
    calibration: Calibration,
    zone: SpeedZone,
    detector: Box<dyn Detect>,
    factory: Box<dyn TrackerFactory>,
    annotator: Annotator,
    scene: Scene,
    frame_counter: u64,
    stats: PipelineStats,
}

impl SpeedPipeline {
    pub fn new(
        config: &Config,
        detector: Box<dyn Detect>,
        factory: Box<dyn TrackerFactory>,
    ) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            interval: config.detection.interval,
            params: config.detection.params.clone(),
            calibration: config.calibration,
            zone: config.zone,
            detector,
            factory,
            annotator: Annotator::new(config.style.clone())?,
            scene: Scene::new(),
            frame_counter: 0,
            stats: PipelineStats::default(),
        })
    }

    /// Runs one frame through detection (on cycle frames), tracking, speed
    /// sampling and annotation.
    ///
    /// Frames are numbered by the pipeline itself, starting at 1; the index the
    /// source put on the frame is overwritten.
    pub fn process(&mut self, mut frame: Frame) -> Result<AnnotatedFrame, Error> {
        self.frame_counter += 1;
        frame.index = self.frame_counter;

        // shared by the detector and every tracker on this frame
        let gray = frame.gray();

        let detected = self.frame_counter % self.interval == 0;
        if detected {
            let boxes = self.detector.detect(&gray, &self.params)?;

            debug!(
                frame = frame.index,
                detections = boxes.len(),
                "detection cycle"
            );

            let created = self.scene.rebuild(&frame, &gray, &boxes, self.factory.as_mut())?;
            self.stats.detection_cycles += 1;
            self.stats.tracks_created += created as u64;
        }

        let live = self.scene.tracks.iter().filter(|t| !t.lost).count();
        let updates = self.scene.update(&frame, &gray, &self.zone, &self.calibration)?;

        self.stats.frames += 1;
        self.stats.tracks_lost += (live - updates.len()) as u64;
        self.stats.speeds_measured += updates.iter().filter(|u| u.sampled).count() as u64;

        let annotations = self.annotator.annotate(&updates, &self.zone);

        // detector and trackers are done with the pixels, the frame becomes the output copy
        let mut image = frame;
        self.annotator.render(&mut image, &annotations)?;

        Ok(AnnotatedFrame {
            index: image.index,
            image,
            annotations,
            detected,
        })
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[inline]
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    #[inline]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    #[inline]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    #[inline]
    pub fn zone(&self) -> &SpeedZone {
        &self.zone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BoundingBox;
    use crate::frame::GrayFrame;
    use crate::tracker::{ObjectTracker, TemplateTracker, TemplateTrackerConfig};

    struct Fixed(Vec<BoundingBox>);

    impl Detect for Fixed {
        fn detect(
            &mut self,
            _frame: &GrayFrame,
            _params: &DetectorParams,
        ) -> Result<Vec<BoundingBox>, Error> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl Detect for Broken {
        fn detect(
            &mut self,
            _frame: &GrayFrame,
            _params: &DetectorParams,
        ) -> Result<Vec<BoundingBox>, Error> {
            Err(Error::Detector("classifier not loaded".into()))
        }
    }

    fn template_factory() -> Box<dyn TrackerFactory> {
        Box::new(TemplateTracker::factory(TemplateTrackerConfig::default()))
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = Config::default();
        config.calibration.pixels_per_meter = -1.0;

        let res = SpeedPipeline::new(&config, Box::new(Fixed(vec![])), template_factory());
        assert!(res.is_err());
    }

    #[test]
    fn test_detects_only_on_interval() {
        let mut config = Config::default();
        config.detection.interval = 3;
        let mut pipeline = SpeedPipeline::new(
            &config,
            Box::new(Fixed(vec![BoundingBox::new(10, 10, 30, 30)])),
            template_factory(),
        )
        .unwrap();

        let detected: Vec<bool> = (0..9)
            .map(|_| pipeline.process(Frame::blank(0, 64, 48)).unwrap().detected)
            .collect();

        assert_eq!(
            detected,
            vec![false, false, true, false, false, true, false, false, true]
        );
        assert_eq!(pipeline.stats().detection_cycles, 3);
        assert_eq!(pipeline.stats().tracks_created, 3);
        assert_eq!(pipeline.frame_counter(), 9);
    }

    #[test]
    fn test_frames_are_renumbered() {
        let config = Config::default();
        let mut pipeline =
            SpeedPipeline::new(&config, Box::new(Fixed(vec![])), template_factory()).unwrap();

        assert_eq!(pipeline.process(Frame::blank(77, 8, 8)).unwrap().index, 1);
        assert_eq!(pipeline.process(Frame::blank(3, 8, 8)).unwrap().index, 2);
    }

    #[test]
    fn test_detector_error_propagates() {
        let mut config = Config::default();
        config.detection.interval = 1;
        let mut pipeline =
            SpeedPipeline::new(&config, Box::new(Broken), template_factory()).unwrap();

        assert!(matches!(
            pipeline.process(Frame::blank(0, 8, 8)),
            Err(Error::Detector(_))
        ));
    }

    #[test]
    fn test_lost_tracks_are_counted_once() {
        let mut config = Config::default();
        config.detection.interval = 2;

        // the object only exists on the detection frame
        let bbox = BoundingBox::new(10, 10, 12, 12);
        let mut pipeline = SpeedPipeline::new(
            &config,
            Box::new(Fixed(vec![bbox])),
            Box::new(|| -> Result<Box<dyn ObjectTracker>, Error> {
                Ok(Box::new(TemplateTracker::default()))
            }),
        )
        .unwrap();

        pipeline.process(Frame::blank(0, 64, 48)).unwrap();

        let mut painted = Frame::blank(0, 64, 48);
        painted.fill(&bbox, [255, 255, 255]);
        let out = pipeline.process(painted).unwrap();
        assert!(out.detected);
        assert_eq!(out.annotations.len(), 1);

        let out = pipeline.process(Frame::blank(0, 64, 48)).unwrap();
        assert!(out.annotations.is_empty());
        pipeline.process(Frame::blank(0, 64, 48)).unwrap();

        assert_eq!(pipeline.stats().tracks_lost, 1);
    }

    #[test]
    fn test_stationary_object_overhanging_the_frame_gets_no_speed() {
        // 60x250 seed at (100, 280) runs 50 rows past the bottom of a 640x480 frame
        let seed = BoundingBox::new(100, 280, 60, 250);
        let footage = || {
            let mut frame = Frame::blank(0, 640, 480);
            frame.fill(&seed, [255, 255, 255]);
            frame
        };

        let detector = Box::new(Fixed(vec![seed]));
        let mut pipeline =
            SpeedPipeline::new(&Config::default(), detector, template_factory()).unwrap();

        for _ in 0..15 {
            let out = pipeline.process(footage()).unwrap();
            for ann in &out.annotations {
                assert_eq!(ann.bbox, BoundingBox::new(100, 280, 60, 200));
                assert_eq!(ann.speed, None);
            }
        }

        assert_eq!(pipeline.stats().tracks_created, 1);
        assert_eq!(pipeline.stats().speeds_measured, 0);
        assert_eq!(pipeline.scene().get(0).and_then(|t| t.speed()), None);
    }
}
