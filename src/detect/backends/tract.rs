#![cfg(feature = "backend-tract")]

use std::path::Path;

use tract_onnx::prelude::*;

use crate::detect::backend::{
    CompletedRequests, Device, InferenceEngine, InputShape, RequestId, RequestStatus, Tensor,
};
use crate::detect::error::EngineError;
use crate::detect::result::Detection;

/// Values per detection row of an SSD `DetectionOutput` tensor:
/// `[image_id, label, confidence, x_min, y_min, x_max, y_max]`.
const SSD_ROW_LEN: usize = 7;

type Plan = TypedRunnableModel<TypedModel>;

/// Tract-based backend for ONNX SSD-style detectors.
///
/// The model must take a single `1x3xHxW` f32 input and produce a
/// `1x1xNx7` detection tensor. Only the CPU device is available.
pub struct TractBackend {
    model: Plan,
    device: Device,
    shape: InputShape,
    requests: CompletedRequests,
}

impl TractBackend {
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        device: Device,
        shape: InputShape,
    ) -> Result<Self, EngineError> {
        if !device.includes(&Device::Cpu) {
            return Err(EngineError::UnsupportedDevice {
                backend: "tract",
                device,
            });
        }

        let model_path = model_path.as_ref();
        let load_error = |e: TractError| EngineError::ModelLoad {
            path: model_path.display().to_string(),
            message: format!("{e:#}"),
        };

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(load_error)?;

        let unsupported: Vec<String> = model
            .nodes()
            .iter()
            .filter(|node| format!("{:?}", node.op).starts_with("UnimplementedOp"))
            .map(|node| node.name.clone())
            .collect();
        if !unsupported.is_empty() {
            for layer in &unsupported {
                log::error!("layer {} is unsupported", layer);
            }
            return Err(EngineError::UnsupportedLayer {
                backend: "tract",
                layers: unsupported,
            });
        }

        let model = model
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, shape.channels, shape.height, shape.width),
                ),
            )
            .map_err(load_error)?
            .into_optimized()
            .map_err(load_error)?
            .into_runnable()
            .map_err(load_error)?;

        log::info!(
            "loaded ONNX model {} (input {})",
            model_path.display(),
            shape
        );
        Ok(Self {
            model,
            device,
            shape,
            requests: CompletedRequests::default(),
        })
    }

    fn run(&self, tensor: &Tensor) -> TractResult<Vec<Detection>> {
        let input = tract_ndarray::Array4::from_shape_vec(
            (1, self.shape.channels, self.shape.height, self.shape.width),
            tensor.data.clone(),
        )?
        .into_tensor();
        let outputs = self.model.run(tvec!(input.into()))?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("model produced no outputs"))?;
        let values: Vec<f32> = output.to_array_view::<f32>()?.iter().copied().collect();
        Ok(parse_ssd_rows(&values))
    }
}

/// Decode SSD detection rows. A negative image id marks the end of the list.
fn parse_ssd_rows(values: &[f32]) -> Vec<Detection> {
    values
        .chunks_exact(SSD_ROW_LEN)
        .take_while(|row| row[0] >= 0.0)
        .map(|row| Detection {
            class_id: row[1].max(0.0) as u32,
            confidence: row[2],
            x1: row[3],
            y1: row[4],
            x2: row[5],
            y2: row[6],
        })
        .collect()
}

impl InferenceEngine for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn start(&mut self, tensor: &Tensor) -> Result<RequestId, EngineError> {
        if tensor.shape != self.shape {
            return Err(EngineError::ShapeMismatch {
                expected: self.shape,
                actual: tensor.shape,
            });
        }
        let detections = self.run(tensor).map_err(|e| EngineError::Backend {
            backend: "tract",
            message: format!("{e:#}"),
        })?;
        Ok(self.requests.insert(detections))
    }

    fn wait(&mut self, id: RequestId) -> Result<RequestStatus, EngineError> {
        self.requests.status(id)
    }

    fn detections(&mut self, id: RequestId) -> Result<Vec<Detection>, EngineError> {
        self.requests.take(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssd_rows_stop_at_terminator() {
        let values = [
            0.0, 1.0, 0.9, 0.1, 0.2, 0.3, 0.4, //
            0.0, 2.0, 0.4, 0.5, 0.5, 0.6, 0.6, //
            -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.9, 0.0, 0.0, 1.0, 1.0,
        ];
        let detections = parse_ssd_rows(&values);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_id, 1);
        assert_eq!(detections[1].class_id, 2);
        assert_eq!(detections[0].x2, 0.3);
    }
}
