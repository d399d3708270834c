//! Frame ingestion sources.
//!
//! Every source yields packed RGB24 `Frame`s in stream order:
//! - Synthetic scenes (`stub://<name>`), always available
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Cameras by index or V4L2 device path (feature: ingest-v4l2)
//!
//! `next_frame` returns `Ok(None)` once the stream has ended. Network URLs are
//! rejected; only local inputs are supported.

#[cfg(feature = "ingest-file-ffmpeg")]
pub mod file;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::frame::Frame;

#[cfg(feature = "ingest-file-ffmpeg")]
pub use file::{FileConfig, FileSource};
pub use synthetic::{SceneConfig, SyntheticSource, DEFAULT_SYNTHETIC_FRAMES};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// A stream of decoded frames.
pub trait FrameSource {
    /// Open the underlying device or file.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// How to open the `--input` argument.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    pub input: String,
    /// Preferred capture size (cameras and synthetic scenes).
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Length of synthetic scenes; `None` uses the scene default.
    pub max_frames: Option<u64>,
    /// Probability that the synthetic scene drops one figure from a frame.
    pub dropout: f64,
    /// Seed for the synthetic scene noise.
    pub seed: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            input: "stub://walkers".to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
            max_frames: None,
            dropout: 0.0,
            seed: 0,
        }
    }
}

/// Classified `--input` value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputKind {
    Synthetic(String),
    /// V4L2 device node, including cameras given by index.
    Camera(String),
    File(PathBuf),
}

impl InputKind {
    pub fn classify(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(anyhow!("input must not be empty"));
        }
        if let Some(name) = input.strip_prefix("stub://") {
            return Ok(Self::Synthetic(name.to_string()));
        }
        if input.contains("://") {
            return Err(anyhow!(
                "network inputs are not supported (got '{}'); use a local file or camera",
                input
            ));
        }
        if input.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Self::Camera(format!("/dev/video{}", input)));
        }
        if input.starts_with("/dev/video") {
            return Ok(Self::Camera(input.to_string()));
        }
        Ok(Self::File(PathBuf::from(input)))
    }
}

/// Open the source named by `config.input`. The source is not yet connected.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    match InputKind::classify(&config.input)? {
        InputKind::Synthetic(name) => Ok(Box::new(SyntheticSource::new(
            &name,
            SceneConfig::from_source_config(config),
        )?)),
        InputKind::Camera(device) => open_camera(device, config),
        InputKind::File(path) => open_file(path, config),
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_camera(device: String, config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(V4l2Config {
        device,
        target_fps: config.target_fps,
        width: config.width,
        height: config.height,
    })))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_camera(device: String, _config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "camera input {} requires the ingest-v4l2 feature",
        device
    ))
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_file(path: PathBuf, config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FileSource::new(FileConfig {
        path,
        target_fps: config.target_fps,
    })?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_file(path: PathBuf, _config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "file input {} requires the ingest-file-ffmpeg feature",
        path.display()
    ))
}
