use crate::error::Error;
use crate::pipeline::{AnnotatedFrame, PipelineStats, SpeedPipeline};
use crate::source::FrameSource;

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEnd {
    Exhausted,
    Failed(String),
}

/// One camera: a frame source driving its own pipeline.
pub struct Feed {
    name: String,
    source: Box<dyn FrameSource>,
    pipeline: SpeedPipeline,
    end: Option<FeedEnd>,
}

impl Feed {
    pub fn new<S>(name: S, source: Box<dyn FrameSource>, pipeline: SpeedPipeline) -> Self
    where
        S: ToString,
    {
        Self {
            name: name.to_string(),
            source,
            pipeline,
            end: None,
        }
    }

    /// Pulls and processes the next frame. A decode failure ends the feed the
    /// same way the end of the stream does, it is only logged and recorded.
    pub fn pull(&mut self) -> Result<Option<AnnotatedFrame>, Error> {
        if self.end.is_some() {
            return Ok(None);
        }

        match self.source.next_frame() {
            Ok(Some(frame)) => self.pipeline.process(frame).map(Some),
            Ok(None) => {
                info!(feed = %self.name, frames = self.pipeline.frame_counter(), "feed exhausted");
                self.end = Some(FeedEnd::Exhausted);
                Ok(None)
            }
            Err(err) => {
                warn!(feed = %self.name, source = self.source.name(), "stopping feed: {}", err);
                self.end = Some(FeedEnd::Failed(err.to_string()));
                Ok(None)
            }
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn end(&self) -> Option<&FeedEnd> {
        self.end.as_ref()
    }

    #[inline]
    pub fn pipeline(&self) -> &SpeedPipeline {
        &self.pipeline
    }

    #[inline]
    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }
}

#[derive(Debug, Clone)]
pub struct FeedFrame {
    pub feed: String,
    pub frame: AnnotatedFrame,
}

/// Drives several feeds in lock-step: frame `k` of every feed is processed
/// before frame `k + 1` of any of them, and all feeds stop together as soon as
/// one of them runs dry.
#[derive(Default)]
pub struct FeedSet {
    feeds: Vec<Feed>,
    stopped: bool,
    rounds: u64,
}

impl FeedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feed: Feed) {
        self.feeds.push(feed);
    }

    pub fn with_feed(mut self, feed: Feed) -> Self {
        self.push(feed);
        self
    }

    /// One round: a frame from every feed, in insertion order, or `None` once
    /// any feed has ended. Frames already pulled in the failing round are dropped.
    pub fn tick(&mut self) -> Result<Option<Vec<FeedFrame>>, Error> {
        if self.stopped || self.feeds.is_empty() {
            return Ok(None);
        }

        let mut frames = Vec::with_capacity(self.feeds.len());
        for feed in &mut self.feeds {
            match feed.pull()? {
                Some(frame) => frames.push(FeedFrame {
                    feed: feed.name.clone(),
                    frame,
                }),
                None => {
                    info!(
                        feed = %feed.name,
                        rounds = self.rounds,
                        "feed ended, stopping all feeds"
                    );
                    self.stopped = true;
                    return Ok(None);
                }
            }
        }

        self.rounds += 1;
        Ok(Some(frames))
    }

    /// Ticks until a feed ends or `active` is cleared. The flag is checked once
    /// per round, never in the middle of one. Returns the number of rounds run.
    pub fn run<F>(&mut self, active: &AtomicBool, on_round: F) -> Result<u64, Error>
    where
        F: FnMut(&[FeedFrame]) -> Result<(), Error>,
    {
        self.run_limited(active, None, on_round)
    }

    /// Same as [`run`](Self::run), but runs at most `max_rounds` rounds in this
    /// call. The limit is checked before a round starts, so `Some(0)` pulls no
    /// frame at all.
    pub fn run_limited<F>(
        &mut self,
        active: &AtomicBool,
        max_rounds: Option<u64>,
        mut on_round: F,
    ) -> Result<u64, Error>
    where
        F: FnMut(&[FeedFrame]) -> Result<(), Error>,
    {
        let start = self.rounds;

        while active.load(Ordering::Acquire) {
            if max_rounds.map_or(false, |max| self.rounds - start >= max) {
                break;
            }

            match self.tick()? {
                Some(frames) => on_round(&frames)?,
                None => break,
            }
        }

        Ok(self.rounds - start)
    }

    #[inline]
    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    #[inline]
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}
