use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image Error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Yaml Error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Json Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unable to open source {src}: {reason}")]
    SourceOpen { src: String, reason: String },

    #[error("failed to decode frame {index} of {src}: {reason}")]
    Decode {
        src: String,
        index: u64,
        reason: String,
    },

    #[error("detector failure: {0}")]
    Detector(String),

    #[error("tracker failure: {0}")]
    Tracker(String),

    #[error("frame buffer is not contiguous")]
    NonContiguousFrame,

    #[cfg(feature = "opencv-backend")]
    #[error("OpenCV Error: {0}")]
    OpenCvError(#[from] opencv::Error),
}
