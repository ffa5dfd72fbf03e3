use crate::bbox::BoundingBox;
use crate::detection::Detection;
use crate::error::Error;
use crate::frame::GrayFrame;

use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// Multi-scale detector tunables. Treated as opaque and passed through to the
/// classifier as is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorParams {
    pub scale_factor: f64,
    pub min_neighbors: i32,
    pub flags: i32,
    pub min_size: [i32; 2],
    pub max_size: Option<[i32; 2]>,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 13,
            flags: 18,
            min_size: [24, 24],
            max_size: None,
        }
    }
}

impl DetectorParams {
    /// Whether a box satisfies the min/max object size constraints.
    pub fn accepts(&self, bbox: &BoundingBox) -> bool {
        let [min_w, min_h] = self.min_size;
        if bbox.width() < min_w || bbox.height() < min_h {
            return false;
        }

        match self.max_size {
            Some([max_w, max_h]) => bbox.width() <= max_w && bbox.height() <= max_h,
            None => true,
        }
    }
}

/// Finds vehicles on a grayscale frame.
pub trait Detect {
    fn detect(
        &mut self,
        frame: &GrayFrame,
        params: &DetectorParams,
    ) -> Result<Vec<BoundingBox>, Error>;
}

impl<D: Detect + ?Sized> Detect for Box<D> {
    #[inline]
    fn detect(
        &mut self,
        frame: &GrayFrame,
        params: &DetectorParams,
    ) -> Result<Vec<BoundingBox>, Error> {
        (**self).detect(frame, params)
    }
}

/// Plays back detections recorded offline.
///
/// Each line of a dump is `<frame index>:<json array of detections>`; a line
/// without the prefix belongs to the frame matching its 1-based line number.
pub struct ReplayDetector {
    frames: HashMap<u64, Vec<Detection>>,
    min_confidence: f32,
    classes: Option<Vec<i32>>,
}

impl ReplayDetector {
    pub fn new(frames: HashMap<u64, Vec<Detection>>) -> Self {
        Self {
            frames,
            min_confidence: 0.0,
            classes: None,
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut frames = HashMap::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (index, vector) = match line.find(':') {
                Some(idx) if !line.starts_with('[') => {
                    let (prefix, vector) = line.split_at(idx);
                    let index = prefix.trim().parse::<u64>().map_err(|err| {
                        Error::Detector(format!("line {}: bad frame index: {}", lineno + 1, err))
                    })?;

                    (index, &vector[1..])
                }
                _ => (lineno as u64 + 1, line),
            };

            let dets: Vec<Detection> = serde_json::from_str(vector)?;
            frames.insert(index, dets);
        }

        Ok(Self::new(frames))
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_classes(mut self, classes: Vec<i32>) -> Self {
        self.classes = Some(classes);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Detect for ReplayDetector {
    fn detect(
        &mut self,
        frame: &GrayFrame,
        params: &DetectorParams,
    ) -> Result<Vec<BoundingBox>, Error> {
        let dets = match self.frames.get(&frame.index) {
            Some(dets) => dets,
            None => return Ok(Vec::new()),
        };

        Ok(dets
            .iter()
            .filter(|det| det.confidence >= self.min_confidence)
            .filter(|det| match &self.classes {
                Some(classes) => classes.contains(&det.class),
                None => true,
            })
            .map(Detection::bbox)
            .filter(|bbox| params.accepts(bbox))
            .collect())
    }
}
