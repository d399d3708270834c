//! Raw video output.
//!
//! Annotated frames are written as packed RGB24 bytes, one frame after the
//! other, for a downstream encoder such as `ffmpeg -f rawvideo`. When the
//! reader goes away (broken pipe) the sink closes itself and further frames
//! are dropped; the caller keeps counting.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::Path;

use crate::frame::Frame;

/// `--video-out` value for stdout.
pub const STDOUT_TARGET: &str = "-";
/// `--video-out` value that disables video output.
pub const DISABLED_TARGET: &str = "none";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkState {
    Open,
    /// The reader disconnected.
    Closed,
    Disabled,
}

pub struct VideoSink {
    writer: Option<Box<dyn Write>>,
    state: SinkState,
    frames_written: u64,
    bytes_written: u64,
    errors: u64,
}

impl VideoSink {
    /// Open `-` (stdout), `none`, or a file path.
    pub fn open(target: &str) -> Result<Self> {
        match target.trim() {
            DISABLED_TARGET | "" => Ok(Self::disabled()),
            STDOUT_TARGET => Ok(Self::from_writer(Box::new(BufWriter::new(io::stdout())))),
            path => {
                let file = File::create(Path::new(path))
                    .with_context(|| format!("failed to create video output {}", path))?;
                Ok(Self::from_writer(Box::new(BufWriter::new(file))))
            }
        }
    }

    pub fn from_writer(writer: Box<dyn Write>) -> Self {
        Self {
            writer: Some(writer),
            state: SinkState::Open,
            frames_written: 0,
            bytes_written: 0,
            errors: 0,
        }
    }

    pub fn disabled() -> Self {
        Self {
            writer: None,
            state: SinkState::Disabled,
            frames_written: 0,
            bytes_written: 0,
            errors: 0,
        }
    }

    /// Write one frame. Returns whether the frame reached the writer.
    ///
    /// Write errors are logged, never returned.
    pub fn write_frame(&mut self, frame: &Frame) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        let pixels = frame.pixels();
        match writer.write_all(pixels) {
            Ok(()) => {
                self.frames_written += 1;
                self.bytes_written += pixels.len() as u64;
                true
            }
            Err(err) => {
                self.handle_error(err, frame.index);
                false
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush() {
                self.handle_error(err, self.frames_written);
            }
        }
    }

    fn handle_error(&mut self, err: io::Error, frame_index: u64) {
        self.errors += 1;
        if err.kind() == ErrorKind::BrokenPipe {
            log::warn!(
                "video reader disconnected at frame {}; dropping further frames",
                frame_index
            );
            self.writer = None;
            self.state = SinkState::Closed;
        } else {
            log::error!("video write failed at frame {}: {}", frame_index, err);
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }
}
