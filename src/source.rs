use crate::error::Error;
use crate::frame::Frame;

use image::imageops::{self, FilterType};
use ndarray::Array3;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

/// Lazy, finite, non-restartable sequence of frames.
pub trait FrameSource {
    /// `Ok(None)` marks the end of the stream, `Err` a frame that could not be decoded.
    fn next_frame(&mut self) -> Result<Option<Frame>, Error>;

    fn name(&self) -> &str;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    #[inline]
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        (**self).next_frame()
    }

    #[inline]
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Frames already in memory.
pub struct MemorySource {
    name: String,
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new<S: ToString>(name: S, frames: Vec<Frame>) -> Self {
        Self {
            name: name.to_string(),
            frames: frames.into(),
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        Ok(self.frames.pop_front())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Numbered stills in a directory, decoded in file name order and resized to
/// a fixed resolution.
pub struct ImageDirSource {
    name: String,
    files: Vec<PathBuf>,
    pos: usize,
    width: u32,
    height: u32,
}

impl ImageDirSource {
    pub fn open<P: AsRef<Path>>(dir: P, width: u32, height: u32) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let name = dir.display().to_string();

        let entries = std::fs::read_dir(dir).map_err(|err| Error::SourceOpen {
            src: name.clone(),
            reason: err.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);

            if is_image && path.is_file() {
                files.push(path);
            }
        }

        if files.is_empty() {
            return Err(Error::SourceOpen {
                src: name,
                reason: "no image files".into(),
            });
        }

        files.sort();

        Ok(Self {
            name,
            files,
            pos: 0,
            width,
            height,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let path = match self.files.get(self.pos) {
            Some(path) => path,
            None => return Ok(None),
        };

        self.pos += 1;
        let index = self.pos as u64;

        let decoded = image::open(path).map_err(|err| Error::Decode {
            src: path.display().to_string(),
            index,
            reason: err.to_string(),
        })?;

        let mut rgb = decoded.to_rgb8();
        if rgb.dimensions() != (self.width, self.height) {
            rgb = imageops::resize(&rgb, self.width, self.height, FilterType::Triangle);
        }

        Ok(Some(rgb_to_frame(index, &rgb)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Repacks an RGB image into a BGR frame.
pub fn rgb_to_frame(index: u64, rgb: &image::RgbImage) -> Frame {
    let (width, height) = rgb.dimensions();
    let pixels = Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        rgb.get_pixel(x as u32, y as u32)[2 - c]
    });

    Frame::new(index, pixels)
}

/// Repacks a BGR frame into an RGB image.
pub fn frame_to_rgb(frame: &Frame) -> image::RgbImage {
    let (width, height) = frame.dims();

    image::RgbImage::from_fn(width, height, |x, y| {
        let px = frame.pixels.slice(ndarray::s![y as usize, x as usize, ..]);
        image::Rgb([px[2], px[1], px[0]])
    })
}
