pub mod annotate;
pub mod bbox;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod feeds;
pub mod frame;
pub mod pipeline;
pub mod scene;
pub mod sink;
pub mod source;
pub mod speed;
pub mod tracker;

#[cfg(feature = "opencv-backend")]
pub mod opencv_backend;

mod track;

pub use annotate::{Annotation, Annotator, Label};
pub use bbox::BoundingBox;
pub use config::Config;
pub use detection::Detection;
pub use detector::{Detect, DetectorParams, ReplayDetector};
pub use error::Error;
pub use feeds::{Feed, FeedEnd, FeedFrame, FeedSet};
pub use frame::{Frame, GrayFrame};
pub use pipeline::{AnnotatedFrame, PipelineStats, SpeedPipeline};
pub use scene::{Scene, TrackUpdate};
pub use sink::{FrameSink, ImageDirSink, JsonLinesSink};
pub use source::{FrameSource, ImageDirSource, MemorySource};
pub use speed::{estimate_speed, Calibration, SpeedZone};
pub use track::Track;
pub use tracker::{ObjectTracker, TemplateTracker, TrackerFactory};
