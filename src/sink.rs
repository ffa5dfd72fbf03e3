use crate::annotate::Annotation;
use crate::error::Error;
use crate::pipeline::AnnotatedFrame;
use crate::source::frame_to_rgb;

use serde_derive::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Consumer of annotated frames.
pub trait FrameSink {
    fn write(&mut self, feed: &str, frame: &AnnotatedFrame) -> Result<(), Error>;

    fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    #[inline]
    fn write(&mut self, feed: &str, frame: &AnnotatedFrame) -> Result<(), Error> {
        (**self).write(feed, frame)
    }

    #[inline]
    fn finish(&mut self) -> Result<(), Error> {
        (**self).finish()
    }
}

/// Writes every frame as `<dir>/<feed>_<index>.png`.
pub struct ImageDirSink {
    dir: PathBuf,
    written: u64,
}

impl ImageDirSink {
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir, written: 0 })
    }

    pub fn path_for(&self, feed: &str, index: u64) -> PathBuf {
        self.dir.join(format!("{}_{:06}.png", feed, index))
    }

    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageDirSink {
    fn write(&mut self, feed: &str, frame: &AnnotatedFrame) -> Result<(), Error> {
        frame_to_rgb(&frame.image).save(self.path_for(feed, frame.index))?;
        self.written += 1;

        Ok(())
    }
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    feed: &'a str,
    frame: u64,
    detected: bool,
    tracks: &'a [Annotation],
}

/// One JSON object per frame and line, with every annotation on it.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl JsonLinesSink<std::io::BufWriter<std::fs::File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(std::io::BufWriter::new(file)))
    }
}

impl<W: Write> FrameSink for JsonLinesSink<W> {
    fn write(&mut self, feed: &str, frame: &AnnotatedFrame) -> Result<(), Error> {
        let record = FrameRecord {
            feed,
            frame: frame.index,
            detected: frame.detected,
            tracks: &frame.annotations,
        };

        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;

        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.out.flush()?;
        Ok(())
    }
}
