use anyhow::{bail, Context, Result};
use clap::Parser;
use speedtrack::{
    Config, Detect, Feed, FeedSet, FrameSink, FrameSource, ImageDirSink, ImageDirSource,
    JsonLinesSink, ReplayDetector, SpeedPipeline, TemplateTracker, TrackerFactory,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "opencv-backend")]
use speedtrack::opencv_backend;

/// Vehicle speed estimation over one or more camera feeds
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config, defaults are used for anything missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera feed as NAME=PATH, PATH is a directory of numbered stills
    /// (or a video file with the OpenCV backend). Repeat for several feeds.
    #[arg(short, long = "feed", value_parser = parse_named, required = true)]
    feeds: Vec<(String, PathBuf)>,

    /// Recorded detections for a feed as NAME=PATH
    #[arg(short, long = "detections", value_parser = parse_named)]
    detections: Vec<(String, PathBuf)>,

    /// Haar cascade used for feeds without recorded detections
    #[cfg(feature = "opencv-backend")]
    #[arg(long)]
    cascade: Option<PathBuf>,

    /// Tracker: template or kcf (OpenCV backend only)
    #[arg(long, default_value = "template")]
    tracker: String,

    /// Directory for annotated frames
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Encode annotated frames as video instead of stills
    #[cfg(feature = "opencv-backend")]
    #[arg(long)]
    video: bool,

    /// JSON lines file receiving every annotation
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Stop after this many rounds
    #[arg(long)]
    max_rounds: Option<u64>,

    #[arg(long)]
    pixels_per_meter: Option<f32>,

    #[arg(long)]
    fps: Option<f32>,

    /// Run the detector every n-th frame
    #[arg(long)]
    interval: Option<u64>,
}

fn parse_named(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got `{}`", s)),
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(ppm) = args.pixels_per_meter {
        config.calibration.pixels_per_meter = ppm;
    }

    if let Some(fps) = args.fps {
        config.calibration.frames_per_second = fps;
    }

    if let Some(interval) = args.interval {
        config.detection.interval = interval;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_source(path: &Path, config: &Config) -> Result<Box<dyn FrameSource>> {
    let (width, height) = (config.video.width, config.video.height);

    if path.is_dir() {
        let source = ImageDirSource::open(path, width, height)?;
        return Ok(Box::new(source));
    }

    open_video(path, width, height)
}

#[cfg(feature = "opencv-backend")]
fn open_video(path: &Path, width: u32, height: u32) -> Result<Box<dyn FrameSource>> {
    let source = opencv_backend::VideoFileSource::open(&path.display().to_string(), width, height)?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "opencv-backend"))]
fn open_video(path: &Path, _width: u32, _height: u32) -> Result<Box<dyn FrameSource>> {
    bail!(
        "{} is not a directory, video files need the opencv-backend feature",
        path.display()
    )
}

fn open_detector(
    feed: &str,
    detections: &HashMap<String, PathBuf>,
    args: &Args,
) -> Result<Box<dyn Detect>> {
    if let Some(path) = detections.get(feed) {
        let detector = ReplayDetector::open(path)
            .with_context(|| format!("reading detections {}", path.display()))?;
        info!(feed, frames = detector.len(), "replaying recorded detections");

        return Ok(Box::new(detector));
    }

    fallback_detector(feed, args)
}

#[cfg(feature = "opencv-backend")]
fn fallback_detector(feed: &str, args: &Args) -> Result<Box<dyn Detect>> {
    let path = match &args.cascade {
        Some(path) => path,
        None => bail!("no detections and no cascade for feed `{}`", feed),
    };

    let detector = opencv_backend::CascadeDetector::load(path)
        .with_context(|| format!("loading cascade {}", path.display()))?;

    Ok(Box::new(detector))
}

#[cfg(not(feature = "opencv-backend"))]
fn fallback_detector(feed: &str, _args: &Args) -> Result<Box<dyn Detect>> {
    bail!("no detections for feed `{}`", feed)
}

fn tracker_factory(kind: &str, config: &Config) -> Result<Box<dyn TrackerFactory>> {
    match kind {
        "template" => Ok(Box::new(TemplateTracker::factory(config.tracker.clone()))),

        #[cfg(feature = "opencv-backend")]
        "kcf" => Ok(Box::new(opencv_backend::KcfTracker::factory())),

        other => bail!("unknown tracker `{}`", other),
    }
}

#[cfg(feature = "opencv-backend")]
fn open_frame_sink(dir: &Path, args: &Args, config: &Config) -> Result<Box<dyn FrameSink>> {
    if args.video {
        let fps = config.calibration.frames_per_second as f64;
        let sink = opencv_backend::VideoWriterSink::create(dir, fps)?;
        return Ok(Box::new(sink));
    }

    let sink = ImageDirSink::create(dir)
        .with_context(|| format!("creating output dir {}", dir.display()))?;
    Ok(Box::new(sink))
}

#[cfg(not(feature = "opencv-backend"))]
fn open_frame_sink(dir: &Path, _args: &Args, _config: &Config) -> Result<Box<dyn FrameSink>> {
    let sink = ImageDirSink::create(dir)
        .with_context(|| format!("creating output dir {}", dir.display()))?;
    Ok(Box::new(sink))
}

fn open_sinks(args: &Args, config: &Config) -> Result<Vec<Box<dyn FrameSink>>> {
    let mut sinks = Vec::new();

    if let Some(dir) = &args.out {
        sinks.push(open_frame_sink(dir, args, config)?);
    }

    if let Some(path) = &args.dump {
        let sink = JsonLinesSink::create(path)
            .with_context(|| format!("creating dump {}", path.display()))?;
        sinks.push(Box::new(sink) as Box<dyn FrameSink>);
    }

    Ok(sinks)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("speedtrack=info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    info!(
        pixels_per_meter = config.calibration.pixels_per_meter,
        fps = config.calibration.frames_per_second,
        interval = config.detection.interval,
        "configuration loaded"
    );

    let detections: HashMap<String, PathBuf> = args.detections.iter().cloned().collect();
    for name in detections.keys() {
        if !args.feeds.iter().any(|(feed, _)| feed == name) {
            warn!(feed = %name, "detections given for unknown feed");
        }
    }

    let mut set = FeedSet::new();
    for (name, path) in &args.feeds {
        let source = open_source(path, &config)
            .with_context(|| format!("opening feed `{}`", name))?;
        let detector = open_detector(name, &detections, &args)?;
        let factory = tracker_factory(&args.tracker, &config)?;
        let pipeline = SpeedPipeline::new(&config, detector, factory)?;

        info!(feed = %name, source = source.name(), "feed ready");
        set.push(Feed::new(name, source, pipeline));
    }

    let mut sinks = open_sinks(&args, &config)?;
    let active = AtomicBool::new(true);

    let rounds = set.run_limited(&active, args.max_rounds, |frames| {
        for item in frames {
            for sink in sinks.iter_mut() {
                sink.write(&item.feed, &item.frame)?;
            }
        }

        Ok(())
    })?;

    for sink in sinks.iter_mut() {
        sink.finish()?;
    }

    info!(rounds, "run finished");
    for feed in set.feeds() {
        let stats = feed.stats();
        info!(
            feed = feed.name(),
            frames = stats.frames,
            detection_cycles = stats.detection_cycles,
            tracks_created = stats.tracks_created,
            tracks_lost = stats.tracks_lost,
            speeds_measured = stats.speeds_measured,
            ended = ?feed.end(),
            "feed stats"
        );
    }

    Ok(())
}
