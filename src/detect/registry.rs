use super::backend::{Device, InferenceEngine, InputShape};
use super::backends::{LumaBackend, ScriptedBackend};
use super::error::EngineError;

/// Default network input for the built-in detectors.
pub const DEFAULT_INPUT_WIDTH: usize = 320;
pub const DEFAULT_INPUT_HEIGHT: usize = 240;

/// Which backend a `--model` argument refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSpec {
    /// `stub://luma`: built-in bright-figure detector.
    Luma,
    /// `stub://scripted`: engine with an empty script (no detections).
    Scripted,
    /// Path to an ONNX file.
    Onnx(String),
}

impl ModelSpec {
    pub fn parse(model: &str) -> Result<Self, EngineError> {
        let trimmed = model.trim();
        if let Some(name) = trimmed.strip_prefix("stub://") {
            return match name {
                "luma" => Ok(Self::Luma),
                "scripted" => Ok(Self::Scripted),
                _ => Err(EngineError::UnknownModel(model.to_string())),
            };
        }
        if trimmed.contains("://") {
            return Err(EngineError::UnknownModel(model.to_string()));
        }
        if trimmed.to_lowercase().ends_with(".onnx") {
            return Ok(Self::Onnx(trimmed.to_string()));
        }
        Err(EngineError::UnknownModel(model.to_string()))
    }
}

/// Load-time options shared by all backends.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub input: InputShape,
    /// Class id reported for figures found by the luma detector.
    pub person_class_id: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            input: InputShape::rgb(DEFAULT_INPUT_WIDTH, DEFAULT_INPUT_HEIGHT),
            person_class_id: super::result::DEFAULT_PERSON_CLASS_ID,
        }
    }
}

/// Load a network for `device`.
///
/// Fails with `UnsupportedLayer` or `UnsupportedDevice` when the backend
/// cannot execute the model where it was asked to.
pub fn load_engine(
    model: &str,
    device: Device,
    options: &LoadOptions,
) -> Result<Box<dyn InferenceEngine>, EngineError> {
    let spec = ModelSpec::parse(model)?;
    log::info!("loading model {} on {}", model, device);
    match spec {
        ModelSpec::Luma => Ok(Box::new(
            LumaBackend::new(device, options.input)?.with_class_id(options.person_class_id),
        )),
        ModelSpec::Scripted => {
            if !device.includes(&Device::Cpu) {
                return Err(EngineError::UnsupportedDevice {
                    backend: "scripted",
                    device,
                });
            }
            Ok(Box::new(
                ScriptedBackend::new(options.input, Vec::new()).with_device(device),
            ))
        }
        ModelSpec::Onnx(path) => load_onnx(&path, device, options),
    }
}

#[cfg(feature = "backend-tract")]
fn load_onnx(
    path: &str,
    device: Device,
    options: &LoadOptions,
) -> Result<Box<dyn InferenceEngine>, EngineError> {
    let backend = super::backends::TractBackend::load(path, device, options.input)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(
    path: &str,
    _device: Device,
    _options: &LoadOptions,
) -> Result<Box<dyn InferenceEngine>, EngineError> {
    Err(EngineError::ModelLoad {
        path: path.to_string(),
        message: "ONNX models require the backend-tract feature".to_string(),
    })
}
