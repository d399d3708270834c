use crate::detect::backend::{
    CompletedRequests, Device, InferenceEngine, InputShape, RequestId, RequestStatus, Tensor,
};
use crate::detect::error::EngineError;
use crate::detect::result::{Detection, DEFAULT_PERSON_CLASS_ID};

/// Luma above which a pixel belongs to a figure.
pub const DEFAULT_LUMA_THRESHOLD: f32 = 180.0;
/// Narrower bright runs are treated as noise.
const MIN_RUN_COLUMNS: usize = 2;

/// CPU detector for high-contrast scenes.
///
/// Finds bright figures on a dark background by projecting bright pixels onto
/// the horizontal axis: every run of consecutive bright columns is one figure,
/// boxed by the rows its bright pixels span. Figures must not overlap
/// horizontally. Intended for the synthetic `stub://` sources.
pub struct LumaBackend {
    device: Device,
    shape: InputShape,
    class_id: u32,
    requests: CompletedRequests,
}

impl LumaBackend {
    pub fn new(device: Device, shape: InputShape) -> Result<Self, EngineError> {
        if !device.includes(&Device::Cpu) {
            return Err(EngineError::UnsupportedDevice {
                backend: "luma",
                device,
            });
        }
        Ok(Self {
            device,
            shape,
            class_id: DEFAULT_PERSON_CLASS_ID,
            requests: CompletedRequests::default(),
        })
    }

    pub fn with_class_id(mut self, class_id: u32) -> Self {
        self.class_id = class_id;
        self
    }

    fn is_bright(&self, tensor: &Tensor, y: usize, x: usize) -> bool {
        let luma = 0.299 * tensor.value(0, y, x)
            + 0.587 * tensor.value(1, y, x)
            + 0.114 * tensor.value(2, y, x);
        luma >= DEFAULT_LUMA_THRESHOLD
    }

    fn find_figures(&self, tensor: &Tensor) -> Vec<Detection> {
        let InputShape { height, width, .. } = tensor.shape;

        // Row span of bright pixels per column, if any.
        let columns: Vec<Option<(usize, usize, usize)>> = (0..width)
            .map(|x| {
                let mut span: Option<(usize, usize, usize)> = None;
                for y in 0..height {
                    if self.is_bright(tensor, y, x) {
                        span = Some(match span {
                            Some((top, _, lit)) => (top, y, lit + 1),
                            None => (y, y, 1),
                        });
                    }
                }
                span
            })
            .collect();

        let mut detections = Vec::new();
        let mut x = 0;
        while x < width {
            if columns[x].is_none() {
                x += 1;
                continue;
            }
            let start = x;
            let (mut top, mut bottom, mut lit) = (usize::MAX, 0, 0);
            while x < width {
                let Some((t, b, l)) = columns[x] else {
                    break;
                };
                top = top.min(t);
                bottom = bottom.max(b);
                lit += l;
                x += 1;
            }
            let run = x - start;
            if run < MIN_RUN_COLUMNS {
                continue;
            }
            let area = run * (bottom - top + 1);
            detections.push(Detection {
                class_id: self.class_id,
                confidence: (lit as f32 / area as f32).clamp(0.0, 1.0),
                x1: start as f32 / width as f32,
                y1: top as f32 / height as f32,
                x2: x as f32 / width as f32,
                y2: (bottom + 1) as f32 / height as f32,
            });
        }
        detections
    }
}

impl InferenceEngine for LumaBackend {
    fn name(&self) -> &'static str {
        "luma"
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn start(&mut self, tensor: &Tensor) -> Result<RequestId, EngineError> {
        if tensor.shape != self.shape || tensor.data.len() != self.shape.element_count() {
            return Err(EngineError::ShapeMismatch {
                expected: self.shape,
                actual: tensor.shape,
            });
        }
        let detections = self.find_figures(tensor);
        Ok(self.requests.insert(detections))
    }

    fn wait(&mut self, id: RequestId) -> Result<RequestStatus, EngineError> {
        self.requests.status(id)
    }

    fn detections(&mut self, id: RequestId) -> Result<Vec<Detection>, EngineError> {
        self.requests.take(id)
    }
}
