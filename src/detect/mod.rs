//! Inference boundary.
//!
//! The pipeline talks to detectors only through `InferenceEngine`: start a
//! request with a preprocessed tensor, poll until it is ready, then take its
//! detections. Backends are picked from the `--model` argument by
//! `load_engine`.

mod backend;
pub mod backends;
mod error;
mod registry;
mod result;

pub use backend::{Device, InferenceEngine, InputShape, RequestId, RequestStatus, Tensor};
pub use backends::{LumaBackend, ScriptedBackend};
pub use error::EngineError;
pub use registry::{
    load_engine, LoadOptions, ModelSpec, DEFAULT_INPUT_HEIGHT, DEFAULT_INPUT_WIDTH,
};
pub use result::{
    count_people, Detection, PersonFilter, DEFAULT_PERSON_CLASS_ID, DEFAULT_PROB_THRESHOLD,
};
