//! Video decoding, cascade detection and KCF tracking on top of OpenCV.

use crate::annotate::Label;
use crate::bbox::BoundingBox;
use crate::detector::{Detect, DetectorParams};
use crate::error::Error;
use crate::frame::{Frame, GrayFrame};
use crate::pipeline::AnnotatedFrame;
use crate::sink::FrameSink;
use crate::source::FrameSource;
use crate::tracker::{ObjectTracker, TrackerFactory};

use opencv::{core, imgproc, objdetect, prelude::*, tracking, videoio};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

fn frame_to_mat(frame: &Frame) -> Result<core::Mat, Error> {
    let data = frame.pixels.as_slice().ok_or(Error::NonContiguousFrame)?;
    let header = core::Mat::from_slice(data)?.reshape(3, frame.height() as i32)?;

    let mut mat = core::Mat::default();
    header.copy_to(&mut mat)?;
    Ok(mat)
}

fn gray_to_mat(frame: &GrayFrame) -> Result<core::Mat, Error> {
    let (_, height) = frame.dims();
    let data = frame.pixels.as_slice().ok_or(Error::NonContiguousFrame)?;
    let header = core::Mat::from_slice(data)?.reshape(1, height as i32)?;

    let mut mat = core::Mat::default();
    header.copy_to(&mut mat)?;
    Ok(mat)
}

fn mat_to_frame(index: u64, mat: core::Mat) -> Result<Frame, Error> {
    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let typed = mat.try_into_typed::<core::Vec3b>()?;
    let data: Vec<u8> = typed
        .data_typed()?
        .iter()
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    Frame::from_bgr(index, width, height, data)
}

/// Writes labels with the Hershey simplex face, baseline at the label origin.
pub(crate) fn put_labels(
    frame: &mut Frame,
    labels: &[&Label],
    color: [u8; 3],
) -> Result<(), Error> {
    let mut mat = frame_to_mat(frame)?;
    let [b, g, r] = color;

    for label in labels {
        let [x, y] = label.origin;
        imgproc::put_text(
            &mut mat,
            &label.text,
            core::Point::new(x, y),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.75,
            core::Scalar::new(b as f64, g as f64, r as f64, 0.0),
            2,
            imgproc::LINE_8,
            false,
        )?;
    }

    frame.pixels = mat_to_frame(frame.index, mat)?.pixels;
    Ok(())
}

#[inline]
fn to_rect(bbox: &BoundingBox) -> core::Rect {
    core::Rect::new(bbox.x(), bbox.y(), bbox.width(), bbox.height())
}

#[inline]
fn from_rect(rect: &core::Rect) -> BoundingBox {
    BoundingBox::new(rect.x, rect.y, rect.width, rect.height)
}

/// Video file or stream decoded with `VideoCapture`, resized to a fixed resolution.
pub struct VideoFileSource {
    name: String,
    cap: videoio::VideoCapture,
    size: core::Size,
    index: u64,
}

impl VideoFileSource {
    pub fn open(path: &str, width: u32, height: u32) -> Result<Self, Error> {
        let cap = videoio::VideoCapture::from_file(path, videoio::CAP_ANY)?;

        if !videoio::VideoCapture::is_opened(&cap)? {
            return Err(Error::SourceOpen {
                src: path.to_string(),
                reason: "capture did not open".into(),
            });
        }

        Ok(Self {
            name: path.to_string(),
            cap,
            size: core::Size::new(width as i32, height as i32),
            index: 0,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let mut mat = core::Mat::default();
        let grabbed = self.cap.read(&mut mat).map_err(|err| Error::Decode {
            src: self.name.clone(),
            index: self.index + 1,
            reason: err.to_string(),
        })?;

        if !grabbed || mat.rows() == 0 || mat.cols() == 0 {
            return Ok(None);
        }

        self.index += 1;

        if mat.size()? != self.size {
            let mut resized = core::Mat::default();
            imgproc::resize(&mat, &mut resized, self.size, 0.0, 0.0, imgproc::INTER_LINEAR)?;
            mat = resized;
        }

        mat_to_frame(self.index, mat)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Haar cascade vehicle detector.
pub struct CascadeDetector {
    classifier: objdetect::CascadeClassifier,
}

impl CascadeDetector {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().display().to_string();
        let classifier = objdetect::CascadeClassifier::new(&path)?;

        if classifier.empty()? {
            return Err(Error::Detector(format!("cascade {} is empty", path)));
        }

        Ok(Self { classifier })
    }
}

impl Detect for CascadeDetector {
    fn detect(
        &mut self,
        frame: &GrayFrame,
        params: &DetectorParams,
    ) -> Result<Vec<BoundingBox>, Error> {
        let mat = gray_to_mat(frame)?;
        let mut found = core::Vector::<core::Rect>::new();

        let [min_w, min_h] = params.min_size;
        let [max_w, max_h] = params.max_size.unwrap_or([0, 0]);

        self.classifier.detect_multi_scale(
            &mat,
            &mut found,
            params.scale_factor,
            params.min_neighbors,
            params.flags,
            core::Size::new(min_w, min_h),
            core::Size::new(max_w, max_h),
        )?;

        Ok(found.iter().map(|r| from_rect(&r)).collect())
    }
}

/// Kernelized correlation filter tracker.
pub struct KcfTracker {
    inner: Option<core::Ptr<dyn tracking::TrackerKCF>>,
}

impl KcfTracker {
    pub fn new() -> Self {
        Self { inner: None }
    }

    pub fn factory() -> impl TrackerFactory {
        || -> Result<Box<dyn ObjectTracker>, Error> { Ok(Box::new(KcfTracker::new())) }
    }
}

impl Default for KcfTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTracker for KcfTracker {
    fn init(
        &mut self,
        frame: &Frame,
        _gray: &GrayFrame,
        bbox: BoundingBox,
    ) -> Result<BoundingBox, Error> {
        let mat = frame_to_mat(frame)?;
        let mut tracker = tracking::TrackerKCF::create(&tracking::TrackerKCF_Params::default()?)?;
        tracker.init(&mat, to_rect(&bbox))?;

        self.inner = Some(tracker);
        Ok(bbox)
    }

    fn update(&mut self, frame: &Frame, _gray: &GrayFrame) -> Result<Option<BoundingBox>, Error> {
        let tracker = match self.inner.as_mut() {
            Some(tracker) => tracker,
            None => return Err(Error::Tracker("update before init".into())),
        };

        let mat = frame_to_mat(frame)?;
        let mut rect = core::Rect::default();

        if tracker.update(&mat, &mut rect)? {
            Ok(Some(from_rect(&rect)))
        } else {
            Ok(None)
        }
    }
}

/// Encodes each feed into `<dir>/<feed>.avi` (MJPG), opening the writer on the
/// first frame and reopening it if the frame size changes.
pub struct VideoWriterSink {
    dir: PathBuf,
    fps: f64,
    writers: HashMap<String, (videoio::VideoWriter, core::Size)>,
}

impl VideoWriterSink {
    pub fn create<P: AsRef<Path>>(dir: P, fps: f64) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            fps,
            writers: HashMap::new(),
        })
    }

    fn open(&self, feed: &str, size: core::Size) -> Result<videoio::VideoWriter, Error> {
        let path = self.dir.join(format!("{}.avi", feed));
        info!(
            feed,
            path = %path.display(),
            width = size.width,
            height = size.height,
            "opening video writer"
        );

        let writer = videoio::VideoWriter::new(
            &path.display().to_string(),
            videoio::VideoWriter::fourcc(b'M' as _, b'J' as _, b'P' as _, b'G' as _)?,
            self.fps,
            size,
            true,
        )?;

        Ok(writer)
    }
}

impl FrameSink for VideoWriterSink {
    fn write(&mut self, feed: &str, frame: &AnnotatedFrame) -> Result<(), Error> {
        let mat = frame_to_mat(&frame.image)?;
        let size = mat.size()?;

        let reopen = match self.writers.get(feed) {
            Some((_, current)) => *current != size,
            None => true,
        };

        if reopen {
            if let Some((mut old, _)) = self.writers.remove(feed) {
                old.release()?;
            }

            let writer = self.open(feed, size)?;
            self.writers.insert(feed.to_string(), (writer, size));
        }

        if let Some((writer, _)) = self.writers.get_mut(feed) {
            writer.write(&mat)?;
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        for (_, (mut writer, _)) in self.writers.drain() {
            writer.release()?;
        }

        Ok(())
    }
}
