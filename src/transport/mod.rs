//! Outbound surfaces: count messages over MQTT and raw annotated video.

mod endpoint;
pub mod mqtt;
pub mod video;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

pub use endpoint::{
    build_transport, parse_mqtt_endpoint, MqttEndpoint, TlsMaterials, DEFAULT_MQTT_BROKER,
};
pub use mqtt::{MqttPublisher, MqttSettings, PERSON_TOPIC};
pub use video::{SinkState, VideoSink};

/// Payload published once per processed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMessage {
    /// Smoothed number of people in view.
    pub count: u32,
    /// People that have entered since the stream started.
    pub total: u64,
}

impl CountMessage {
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("serialize count message")
    }
}

/// Sink for count messages.
pub trait CountPublisher {
    fn publish(&mut self, message: &CountMessage) -> Result<()>;

    /// Flush and close. Publishing afterwards is an error.
    fn disconnect(&mut self) -> Result<()>;
}

/// Discards messages (`--no-mqtt`).
#[derive(Debug, Default)]
pub struct NullPublisher;

impl CountPublisher for NullPublisher {
    fn publish(&mut self, _message: &CountMessage) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every message in memory. Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct MemoryPublisher {
    messages: Arc<Mutex<Vec<CountMessage>>>,
    disconnected: Arc<Mutex<bool>>,
}

impl MemoryPublisher {
    pub fn messages(&self) -> Vec<CountMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.lock().map(|d| *d).unwrap_or(false)
    }
}

impl CountPublisher for MemoryPublisher {
    fn publish(&mut self, message: &CountMessage) -> Result<()> {
        if self.is_disconnected() {
            anyhow::bail!("publisher is disconnected");
        }
        self.messages
            .lock()
            .map_err(|_| anyhow::anyhow!("message log poisoned"))?
            .push(*message);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        *self
            .disconnected
            .lock()
            .map_err(|_| anyhow::anyhow!("message log poisoned"))? = true;
        Ok(())
    }
}
