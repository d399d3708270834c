//! People counter
//!
//! Counts people walking through a video feed. Each frame is run through an
//! object detector, the confident person detections are counted, and the
//! noisy per-frame counts are smoothed into a stable occupancy figure plus a
//! cumulative total of arrivals. Counts are published over MQTT and the
//! annotated frames are streamed as raw RGB to a downstream encoder.
//!
//! # Module Structure
//!
//! - `tracker`: occupancy smoothing over a history window (the core state)
//! - `detect`: inference engine contract, backends, person filtering
//! - `frame`: packed RGB frames
//! - `ingest`: frame sources (synthetic scenes, files, cameras)
//! - `preprocess`: frame to NCHW tensor conversion
//! - `render`: person box overlays
//! - `transport`: MQTT count publisher and raw video sink
//! - `pipeline`: the per-frame loop tying the above together
//! - `config`: layered file, environment and CLI configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod preprocess;
pub mod render;
pub mod tracker;
pub mod transport;

pub use config::{ConfigOverrides, CounterConfig};
pub use detect::{
    count_people, load_engine, Detection, Device, EngineError, InferenceEngine, PersonFilter,
};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceConfig};
pub use pipeline::{CountingPipeline, FrameReport, PipelineOptions, RunSummary};
pub use tracker::{HistoryWindow, Occupancy, OccupancyTracker, TieBreak, TrackerConfig};
pub use transport::{CountMessage, CountPublisher, MqttPublisher, NullPublisher, VideoSink};
