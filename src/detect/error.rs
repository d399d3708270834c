use thiserror::Error;

use super::backend::{Device, InputShape, RequestId};

/// Failures at the inference boundary.
///
/// `UnsupportedLayer` and `UnsupportedDevice` are fatal at startup; the
/// application exits with a dedicated status for them.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model contains layers unsupported by {backend}: {}", .layers.join(", "))]
    UnsupportedLayer {
        backend: &'static str,
        layers: Vec<String>,
    },
    #[error("backend {backend} cannot run on device {device}")]
    UnsupportedDevice {
        backend: &'static str,
        device: Device,
    },
    #[error("unknown device '{0}': expected CPU, GPU, MYRIAD, FPGA, NPU or HETERO:<list>")]
    UnknownDevice(String),
    #[error("no backend for model '{0}'")]
    UnknownModel(String),
    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: String, message: String },
    #[error("tensor shape {actual} does not match network input {expected}")]
    ShapeMismatch {
        expected: InputShape,
        actual: InputShape,
    },
    #[error("unknown inference request {0}")]
    UnknownRequest(RequestId),
    #[error("{backend} inference failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

impl EngineError {
    /// Errors that must stop the process at load time.
    pub fn is_fatal_load_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedLayer { .. } | Self::UnsupportedDevice { .. }
        )
    }
}
