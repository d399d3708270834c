//! The frame loop.
//!
//! One `CountingPipeline` serves one stream. Each frame goes through
//! preprocess, inference, person filtering, occupancy tracking, publication,
//! box drawing and finally the video sink, strictly in that order. The
//! tracker only ever sees a frame's count after that frame's inference
//! request has reported ready.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::detect::{count_people, InferenceEngine, PersonFilter, RequestStatus};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::preprocess::preprocess;
use crate::render::annotate;
use crate::tracker::{Occupancy, OccupancyTracker, TrackerConfig};
use crate::transport::{CountMessage, CountPublisher, VideoSink};

#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    pub tracker: TrackerConfig,
    pub filter: PersonFilter,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

/// What happened to one frame.
#[derive(Clone, Debug, Serialize)]
pub struct FrameReport {
    pub index: u64,
    pub raw_count: u32,
    pub occupancy: Occupancy,
    /// Times the inference request was polled before it was ready.
    pub busy_polls: u32,
    pub published: bool,
    pub written: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub current: u32,
    pub total: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub frames_written: u64,
    /// True when the stop flag ended the run.
    pub interrupted: bool,
    /// Set when a failed frame read ended the stream.
    pub ended_by_error: Option<String>,
}

pub struct CountingPipeline {
    engine: Box<dyn InferenceEngine>,
    tracker: OccupancyTracker,
    filter: PersonFilter,
    publisher: Box<dyn CountPublisher>,
    sink: VideoSink,
    max_frames: Option<u64>,
    frames: u64,
    published: u64,
    publish_failures: u64,
}

impl CountingPipeline {
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        publisher: Box<dyn CountPublisher>,
        sink: VideoSink,
        options: PipelineOptions,
    ) -> Result<Self> {
        let tracker = OccupancyTracker::new(options.tracker)?;
        Ok(Self {
            engine,
            tracker,
            filter: options.filter,
            publisher,
            sink,
            max_frames: options.max_frames,
            frames: 0,
            published: 0,
            publish_failures: 0,
        })
    }

    pub fn tracker(&self) -> &OccupancyTracker {
        &self.tracker
    }

    pub fn sink(&self) -> &VideoSink {
        &self.sink
    }

    /// Run one frame through every stage.
    ///
    /// Inference errors are returned. Publish and video write failures are
    /// logged and reflected in the report only.
    pub fn process_frame(&mut self, mut frame: Frame) -> Result<FrameReport> {
        let tensor = preprocess(&frame, self.engine.input_shape());
        let request = self
            .engine
            .start(&tensor)
            .with_context(|| format!("start inference for frame {}", frame.index))?;

        let mut busy_polls = 0;
        loop {
            match self.engine.wait(request)? {
                RequestStatus::Ready => break,
                RequestStatus::Busy => {
                    busy_polls += 1;
                    std::thread::yield_now();
                }
            }
        }
        let detections = self.engine.detections(request)?;

        let raw_count = count_people(&detections, self.filter);
        let occupancy = self.tracker.observe(raw_count);

        let message = CountMessage {
            count: occupancy.current,
            total: occupancy.total,
        };
        let published = match self.publisher.publish(&message) {
            Ok(()) => {
                self.published += 1;
                true
            }
            Err(e) => {
                self.publish_failures += 1;
                if self.publish_failures == 1 {
                    log::warn!("count publish failed: {:#}", e);
                } else {
                    log::debug!("count publish failed: {:#}", e);
                }
                false
            }
        };

        annotate(&mut frame, &detections, self.filter);
        let written = self.sink.write_frame(&frame);
        self.frames += 1;

        Ok(FrameReport {
            index: frame.index,
            raw_count,
            occupancy,
            busy_polls,
            published,
            written,
        })
    }

    /// Pull frames from a connected `source` until it ends, `stop` is set,
    /// or the frame limit is reached. A failed frame read ends the stream
    /// like end of input does and is recorded in the summary. The publisher
    /// is disconnected and the sink flushed before returning.
    pub fn run(&mut self, source: &mut dyn FrameSource, stop: &AtomicBool) -> Result<RunSummary> {
        self.run_with(source, stop, |_| {})
    }

    /// `run`, calling `on_frame` after every processed frame.
    pub fn run_with<F>(
        &mut self,
        source: &mut dyn FrameSource,
        stop: &AtomicBool,
        mut on_frame: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(&FrameReport),
    {
        let mut interrupted = false;
        let mut ended_by_error = None;
        let mut reported_unhealthy = false;
        let result = loop {
            if stop.load(Ordering::SeqCst) {
                log::info!("stop requested after {} frames", self.frames);
                interrupted = true;
                break Ok(());
            }
            if self.max_frames.is_some_and(|max| self.frames >= max) {
                log::info!("frame limit reached ({})", self.frames);
                break Ok(());
            }
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("end of stream after {} frames", self.frames);
                    break Ok(());
                }
                Err(e) => {
                    let e = e.context("read next frame");
                    log::warn!("stream ended after {} frames: {:#}", self.frames, e);
                    ended_by_error = Some(format!("{:#}", e));
                    break Ok(());
                }
            };
            if !source.is_healthy() && !reported_unhealthy {
                log::warn!("frame source {} reports unhealthy", source.stats().source);
                reported_unhealthy = true;
            }
            match self.process_frame(frame) {
                Ok(report) => on_frame(&report),
                Err(e) => break Err(e),
            }
        };

        self.shutdown();
        result?;
        let mut summary = self.summary(interrupted);
        summary.ended_by_error = ended_by_error;
        Ok(summary)
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.publisher.disconnect() {
            log::warn!("publisher disconnect failed: {:#}", e);
        }
        self.sink.flush();
    }

    pub fn summary(&self, interrupted: bool) -> RunSummary {
        RunSummary {
            frames: self.frames,
            current: self.tracker.current(),
            total: self.tracker.total(),
            published: self.published,
            publish_failures: self.publish_failures,
            frames_written: self.sink.frames_written(),
            interrupted,
            ended_by_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{InputShape, ScriptedBackend};
    use crate::transport::MemoryPublisher;

    fn pipeline(counts: &[u32], recorder: &MemoryPublisher) -> Result<CountingPipeline> {
        let engine = ScriptedBackend::from_counts(InputShape::rgb(8, 6), counts);
        CountingPipeline::new(
            Box::new(engine),
            Box::new(recorder.clone()),
            VideoSink::from_writer(Box::new(Vec::new())),
            PipelineOptions::default(),
        )
    }

    #[test]
    fn every_frame_publishes_the_tracker_state() -> Result<()> {
        let recorder = MemoryPublisher::default();
        let mut pipeline = pipeline(&[1; 12], &recorder)?;
        for index in 0..12 {
            let report = pipeline.process_frame(Frame::filled(16, 12, index, [0, 0, 0])?)?;
            assert_eq!(report.raw_count, 1);
            assert!(report.published);
            assert!(report.written);
        }
        let messages = recorder.messages();
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[4], CountMessage { count: 0, total: 0 });
        assert_eq!(messages[5], CountMessage { count: 1, total: 1 });
        assert_eq!(messages[11], CountMessage { count: 1, total: 1 });
        Ok(())
    }

    #[test]
    fn stop_flag_ends_the_run_before_the_next_frame() -> Result<()> {
        let recorder = MemoryPublisher::default();
        let mut pipeline = pipeline(&[], &recorder)?;
        let mut source = crate::ingest::SyntheticSource::new(
            "stop",
            crate::ingest::SceneConfig::default(),
        )?;
        source.connect()?;
        let stop = AtomicBool::new(true);
        let summary = pipeline.run(&mut source, &stop)?;
        assert!(summary.interrupted);
        assert_eq!(summary.frames, 0);
        assert!(recorder.is_disconnected());
        Ok(())
    }
}
