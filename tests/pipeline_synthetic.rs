use anyhow::Result;
use std::sync::atomic::AtomicBool;

use people_counter::detect::{
    load_engine, Detection, Device, EngineError, InputShape, LoadOptions, ScriptedBackend,
};
use people_counter::ingest::{open_source, FrameSource, SourceConfig, SourceStats};
use people_counter::pipeline::{CountingPipeline, PipelineOptions};
use people_counter::transport::{CountMessage, MemoryPublisher, SinkState, VideoSink};
use people_counter::Frame;

fn synthetic_source(max_frames: u64, dropout: f64, seed: u64) -> Result<Box<dyn FrameSource>> {
    let mut source = open_source(&SourceConfig {
        input: "stub://walkers".to_string(),
        max_frames: Some(max_frames),
        dropout,
        seed,
        ..SourceConfig::default()
    })?;
    source.connect()?;
    Ok(source)
}

fn luma_pipeline(recorder: &MemoryPublisher) -> Result<CountingPipeline> {
    let engine = load_engine("stub://luma", Device::Cpu, &LoadOptions::default())?;
    CountingPipeline::new(
        engine,
        Box::new(recorder.clone()),
        VideoSink::from_writer(Box::new(Vec::new())),
        PipelineOptions::default(),
    )
}

#[test]
fn clean_scene_counts_every_arrival_once() -> Result<()> {
    let recorder = MemoryPublisher::default();
    let mut pipeline = luma_pipeline(&recorder)?;
    let mut source = synthetic_source(380, 0.0, 0)?;

    let mut peak = 0;
    let summary = pipeline.run_with(source.as_mut(), &AtomicBool::new(false), |report| {
        peak = peak.max(report.occupancy.current);
    })?;

    // One walker, a pair, then one more walker.
    assert_eq!(summary.frames, 380);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.current, 0);
    assert_eq!(peak, 2);
    assert!(!summary.interrupted);
    assert_eq!(summary.frames_written, 380);

    let messages = recorder.messages();
    assert_eq!(messages.len(), 380);
    assert_eq!(messages.last(), Some(&CountMessage { count: 0, total: 4 }));
    assert!(messages.windows(2).all(|w| w[0].total <= w[1].total));
    assert!(recorder.is_disconnected());
    Ok(())
}

#[test]
fn smoothing_absorbs_detection_dropouts() -> Result<()> {
    let recorder = MemoryPublisher::default();
    let mut pipeline = luma_pipeline(&recorder)?;
    let mut source = synthetic_source(380, 0.2, 7)?;

    let mut raw_rises = 0u64;
    let mut previous_raw = 0u32;
    let summary = pipeline.run_with(source.as_mut(), &AtomicBool::new(false), |report| {
        if report.raw_count > previous_raw {
            raw_rises += u64::from(report.raw_count - previous_raw);
        }
        previous_raw = report.raw_count;
    })?;

    assert!(summary.total >= 4);
    assert!(
        summary.total < raw_rises,
        "smoothed total {} should be below raw rises {}",
        summary.total,
        raw_rises
    );
    Ok(())
}

#[test]
fn frame_limit_stops_an_endless_source() -> Result<()> {
    let recorder = MemoryPublisher::default();
    let engine = load_engine("stub://luma", Device::Cpu, &LoadOptions::default())?;
    let mut pipeline = CountingPipeline::new(
        engine,
        Box::new(recorder.clone()),
        VideoSink::disabled(),
        PipelineOptions {
            max_frames: Some(25),
            ..PipelineOptions::default()
        },
    )?;
    let mut source = synthetic_source(10_000, 0.0, 0)?;
    let summary = pipeline.run(source.as_mut(), &AtomicBool::new(false))?;
    assert_eq!(summary.frames, 25);
    assert_eq!(summary.frames_written, 0);
    assert_eq!(pipeline.sink().state(), SinkState::Disabled);
    Ok(())
}

#[test]
fn busy_requests_are_awaited_before_counting() -> Result<()> {
    let shape = InputShape::rgb(8, 6);
    let script = vec![vec![
        Detection::person(0.9, 0.1, 0.1, 0.3, 0.9),
        Detection::person(0.3, 0.5, 0.1, 0.7, 0.9),
        Detection {
            class_id: 3,
            confidence: 0.99,
            x1: 0.6,
            y1: 0.1,
            x2: 0.9,
            y2: 0.9,
        },
    ]];
    let engine = ScriptedBackend::new(shape, script).with_busy_polls(3);
    let recorder = MemoryPublisher::default();
    let mut pipeline = CountingPipeline::new(
        Box::new(engine),
        Box::new(recorder.clone()),
        VideoSink::from_writer(Box::new(Vec::new())),
        PipelineOptions::default(),
    )?;

    let report = pipeline.process_frame(Frame::filled(32, 24, 0, [16, 16, 16])?)?;
    assert_eq!(report.busy_polls, 3);
    assert_eq!(report.raw_count, 1);
    assert_eq!(pipeline.tracker().frames_observed(), 1);
    Ok(())
}

#[test]
fn unsupported_device_is_a_fatal_load_error() {
    let err = load_engine("stub://luma", Device::Myriad, &LoadOptions::default())
        .err()
        .expect("luma cannot run on MYRIAD");
    assert!(matches!(err, EngineError::UnsupportedDevice { .. }));

    let err = anyhow::Error::from(err);
    let engine_err = err.downcast_ref::<EngineError>().expect("engine error");
    assert!(engine_err.is_fatal_load_error());
}

#[test]
fn unknown_model_is_not_fatal() {
    let err = load_engine("stub://nope", Device::Cpu, &LoadOptions::default())
        .err()
        .expect("unknown model");
    assert!(!err.is_fatal_load_error());
}

/// Serves a few blank frames, then fails the way an unplugged camera does.
struct FailingSource {
    served: u64,
    fail_after: u64,
}

impl FrameSource for FailingSource {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.served >= self.fail_after {
            return Err(anyhow::anyhow!("capture v4l2 frame: device unplugged"));
        }
        let frame = Frame::filled(16, 12, self.served, [0, 0, 0])?;
        self.served += 1;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        self.served < self.fail_after
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.served,
            source: "failing".to_string(),
        }
    }
}

#[test]
fn failed_frame_read_ends_the_stream_gracefully() -> Result<()> {
    let recorder = MemoryPublisher::default();
    let engine = ScriptedBackend::from_counts(InputShape::rgb(8, 6), &[1, 1, 1]);
    let mut pipeline = CountingPipeline::new(
        Box::new(engine),
        Box::new(recorder.clone()),
        VideoSink::from_writer(Box::new(Vec::new())),
        PipelineOptions::default(),
    )?;
    let mut source = FailingSource {
        served: 0,
        fail_after: 3,
    };

    let summary = pipeline.run(&mut source, &AtomicBool::new(false))?;
    assert_eq!(summary.frames, 3);
    assert!(!summary.interrupted);
    let reason = summary.ended_by_error.expect("read failure recorded");
    assert!(reason.contains("device unplugged"), "{reason}");
    assert_eq!(recorder.messages().len(), 3);
    assert!(recorder.is_disconnected());
    Ok(())
}

#[test]
fn unsupported_layer_is_a_fatal_load_error() {
    let err = EngineError::UnsupportedLayer {
        backend: "tract",
        layers: vec!["DetectionOutput".to_string(), "PriorBox".to_string()],
    };
    assert!(err.to_string().contains("DetectionOutput, PriorBox"));

    let err = anyhow::Error::from(err).context("load model");
    let engine_err = err.downcast_ref::<EngineError>().expect("engine error");
    assert!(engine_err.is_fatal_load_error());
}
