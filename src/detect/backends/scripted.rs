use std::collections::VecDeque;

use crate::detect::backend::{
    CompletedRequests, Device, InferenceEngine, InputShape, RequestId, RequestStatus, Tensor,
};
use crate::detect::error::EngineError;
use crate::detect::result::Detection;

/// Replays canned detections, one entry per request, ignoring pixel content.
///
/// When the script runs out every further request yields no detections.
/// Requests report `Busy` for a configurable number of polls first, which
/// exercises the caller's wait loop.
pub struct ScriptedBackend {
    device: Device,
    shape: InputShape,
    script: VecDeque<Vec<Detection>>,
    busy_polls: u32,
    polls_left: Option<(RequestId, u32)>,
    requests: CompletedRequests,
}

impl ScriptedBackend {
    pub fn new(shape: InputShape, script: Vec<Vec<Detection>>) -> Self {
        Self {
            device: Device::Cpu,
            shape,
            script: script.into(),
            busy_polls: 0,
            polls_left: None,
            requests: CompletedRequests::default(),
        }
    }

    /// Script where frame `i` contains `counts[i]` confident people.
    pub fn from_counts(shape: InputShape, counts: &[u32]) -> Self {
        let script = counts
            .iter()
            .map(|&n| {
                (0..n)
                    .map(|i| {
                        let x = (i as f32 * 0.1).min(0.9);
                        Detection::person(0.9, x, 0.2, x + 0.05, 0.8)
                    })
                    .collect()
            })
            .collect();
        Self::new(shape, script)
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl InferenceEngine for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
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
        let detections = self.script.pop_front().unwrap_or_default();
        let id = self.requests.insert(detections);
        if self.busy_polls > 0 {
            self.polls_left = Some((id, self.busy_polls));
        }
        Ok(id)
    }

    fn wait(&mut self, id: RequestId) -> Result<RequestStatus, EngineError> {
        let status = self.requests.status(id)?;
        if let Some((busy_id, left)) = self.polls_left.as_mut() {
            if *busy_id == id && *left > 0 {
                *left -= 1;
                return Ok(RequestStatus::Busy);
            }
        }
        Ok(status)
    }

    fn detections(&mut self, id: RequestId) -> Result<Vec<Detection>, EngineError> {
        if let Some((busy_id, left)) = self.polls_left {
            if busy_id == id && left > 0 {
                return Err(EngineError::Backend {
                    backend: "scripted",
                    message: format!("request {} is not ready", id),
                });
            }
        }
        self.requests.take(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(shape: InputShape) -> Tensor {
        Tensor {
            shape,
            data: vec![0.0; shape.element_count()],
        }
    }

    #[test]
    fn replays_counts_in_order() -> Result<(), EngineError> {
        let shape = InputShape::rgb(4, 4);
        let mut backend = ScriptedBackend::from_counts(shape, &[2, 0, 1]);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let id = backend.start(&blank(shape))?;
            seen.push(backend.detections(id)?.len());
        }
        assert_eq!(seen, vec![2, 0, 1, 0]);
        assert_eq!(backend.remaining(), 0);
        Ok(())
    }

    #[test]
    fn busy_requests_must_be_polled() -> Result<(), EngineError> {
        let shape = InputShape::rgb(4, 4);
        let mut backend = ScriptedBackend::from_counts(shape, &[1]).with_busy_polls(2);
        let id = backend.start(&blank(shape))?;
        assert!(backend.detections(id).is_err());
        assert_eq!(backend.wait(id)?, RequestStatus::Busy);
        assert_eq!(backend.wait(id)?, RequestStatus::Busy);
        assert_eq!(backend.wait(id)?, RequestStatus::Ready);
        assert_eq!(backend.detections(id)?.len(), 1);
        Ok(())
    }
}
