use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::error::EngineError;
use super::result::Detection;

/// Target device for inference.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
    Myriad,
    Fpga,
    Npu,
    /// Heterogeneous execution across a priority list, e.g. `HETERO:FPGA,CPU`.
    Hetero(Vec<Device>),
}

impl FromStr for Device {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        if let Some(list) = upper.strip_prefix("HETERO:") {
            let devices = list
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(Device::from_str)
                .collect::<Result<Vec<_>, _>>()?;
            if devices.is_empty() {
                return Err(EngineError::UnknownDevice(s.to_string()));
            }
            return Ok(Self::Hetero(devices));
        }
        match upper.as_str() {
            "CPU" => Ok(Self::Cpu),
            "GPU" => Ok(Self::Gpu),
            "MYRIAD" => Ok(Self::Myriad),
            "FPGA" => Ok(Self::Fpga),
            "NPU" => Ok(Self::Npu),
            _ => Err(EngineError::UnknownDevice(s.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Gpu => write!(f, "GPU"),
            Self::Myriad => write!(f, "MYRIAD"),
            Self::Fpga => write!(f, "FPGA"),
            Self::Npu => write!(f, "NPU"),
            Self::Hetero(devices) => {
                let names: Vec<String> = devices.iter().map(|d| d.to_string()).collect();
                write!(f, "HETERO:{}", names.join(","))
            }
        }
    }
}

impl Device {
    /// True when this device (or any member of a heterogeneous list) is `wanted`.
    pub fn includes(&self, wanted: &Device) -> bool {
        match self {
            Self::Hetero(devices) => devices.iter().any(|d| d.includes(wanted)),
            other => other == wanted,
        }
    }
}

/// Network input layout, batch of one NCHW.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl InputShape {
    pub fn rgb(width: usize, height: usize) -> Self {
        Self {
            channels: 3,
            height,
            width,
        }
    }

    pub fn element_count(&self) -> usize {
        self.channels * self.height * self.width
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1x{}x{}x{}", self.channels, self.height, self.width)
    }
}

/// Preprocessed network input, `1 x C x H x W` in row-major order.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub shape: InputShape,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn value(&self, channel: usize, y: usize, x: usize) -> f32 {
        let plane = self.shape.height * self.shape.width;
        self.data[channel * plane + y * self.shape.width + x]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    /// Results can be fetched. Status code 0 of the inference contract.
    Ready,
    /// Still running; poll again.
    Busy,
}

/// Inference engine contract.
///
/// Requests are started with a tensor and identified by a `RequestId` that is
/// unique for the lifetime of the engine. Callers must observe `Ready` from
/// `wait` before fetching detections; detections can be fetched once.
pub trait InferenceEngine: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Device the network was loaded for.
    fn device(&self) -> &Device;

    /// Expected input layout.
    fn input_shape(&self) -> InputShape;

    /// Submit a tensor for inference.
    fn start(&mut self, tensor: &Tensor) -> Result<RequestId, EngineError>;

    /// Check the status of a request.
    fn wait(&mut self, id: RequestId) -> Result<RequestStatus, EngineError>;

    /// Take the detections of a finished request.
    fn detections(&mut self, id: RequestId) -> Result<Vec<Detection>, EngineError>;
}

/// Bookkeeping for engines that finish work inside `start`.
#[derive(Debug, Default)]
pub(crate) struct CompletedRequests {
    next_id: u64,
    results: HashMap<RequestId, Vec<Detection>>,
}

impl CompletedRequests {
    pub(crate) fn insert(&mut self, detections: Vec<Detection>) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.results.insert(id, detections);
        id
    }

    pub(crate) fn status(&self, id: RequestId) -> Result<RequestStatus, EngineError> {
        if self.results.contains_key(&id) {
            Ok(RequestStatus::Ready)
        } else {
            Err(EngineError::UnknownRequest(id))
        }
    }

    pub(crate) fn take(&mut self, id: RequestId) -> Result<Vec<Detection>, EngineError> {
        self.results
            .remove(&id)
            .ok_or(EngineError::UnknownRequest(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_parses_openvino_style_names() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("MYRIAD".parse::<Device>().unwrap(), Device::Myriad);
        let hetero = "HETERO:FPGA,CPU".parse::<Device>().unwrap();
        assert_eq!(hetero, Device::Hetero(vec![Device::Fpga, Device::Cpu]));
        assert!(hetero.includes(&Device::Cpu));
        assert!(!hetero.includes(&Device::Gpu));
        assert_eq!(hetero.to_string(), "HETERO:FPGA,CPU");
        assert!("TPU".parse::<Device>().is_err());
        assert!("HETERO:".parse::<Device>().is_err());
    }

    #[test]
    fn request_ids_are_distinct_and_single_use() {
        let mut requests = CompletedRequests::default();
        let a = requests.insert(Vec::new());
        let b = requests.insert(Vec::new());
        assert_ne!(a, b);
        assert_eq!(requests.status(a).unwrap(), RequestStatus::Ready);
        assert!(requests.take(a).is_ok());
        assert!(matches!(
            requests.take(a),
            Err(EngineError::UnknownRequest(id)) if id == a
        ));
        assert_eq!(requests.results.len(), 1);
    }
}
