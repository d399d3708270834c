//! MQTT publisher for occupancy counts.
//!
//! The rumqttc event loop runs on its own thread. The frame loop only hands
//! messages to the client with `try_publish`, so a slow or absent broker can
//! never stall frame processing.

use anyhow::{anyhow, Result};
use rumqttc::{Client, Connection, Event, MqttOptions, QoS};
use std::path::PathBuf;
use std::time::Duration;

use super::endpoint::{build_transport, parse_mqtt_endpoint, TlsMaterials, DEFAULT_MQTT_BROKER};
use super::{CountMessage, CountPublisher};

/// Topic carrying `{"count", "total"}` updates.
pub const PERSON_TOPIC: &str = "person";
pub const DEFAULT_CLIENT_ID: &str = "people-counter";
pub const KEEP_ALIVE_SECS: u64 = 60;
/// Outstanding requests buffered between the frame loop and the event loop.
const REQUEST_CAPACITY: usize = 32;

/// Connection settings for the broker.
#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub broker_addr: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub tls_ca_path: Option<PathBuf>,
    pub topic: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_addr: DEFAULT_MQTT_BROKER.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            username: None,
            password: None,
            use_tls: false,
            tls_ca_path: None,
            topic: PERSON_TOPIC.to_string(),
        }
    }
}

struct MqttRuntime {
    client: Client,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttRuntime {
    fn new(client: Client, mut connection: Connection) -> Self {
        let handle = std::thread::spawn(move || {
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                    Err(e) => {
                        log::warn!("MQTT connection error: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            client,
            connection_handle: Some(handle),
        }
    }

    fn disconnect(mut self) -> Result<()> {
        let result = self.client.disconnect();
        if let Some(handle) = self.connection_handle.take() {
            if result.is_ok() {
                let _ = handle.join();
            }
        }
        result.map_err(|e| anyhow!("MQTT disconnect failed: {}", e))
    }
}

/// Publishes count messages at QoS 0, not retained.
pub struct MqttPublisher {
    runtime: Option<MqttRuntime>,
    topic: String,
    published: u64,
    failures: u64,
}

impl MqttPublisher {
    /// Configure the client and start its event loop.
    ///
    /// The broker connection itself is established asynchronously; an
    /// unreachable broker shows up as logged publish failures.
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        if settings.topic.trim().is_empty() {
            return Err(anyhow!("MQTT topic must not be empty"));
        }
        let endpoint = parse_mqtt_endpoint(&settings.broker_addr, settings.use_tls)?;
        let tls = TlsMaterials::load(settings.tls_ca_path.as_deref())?;

        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
        options.set_clean_session(true);
        if let Some(user) = &settings.username {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        options.set_transport(build_transport(&endpoint, &tls)?);

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        log::info!(
            "MQTT client for {}:{} started (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            settings.username.is_some()
        );
        Ok(Self {
            runtime: Some(MqttRuntime::new(client, connection)),
            topic: settings.topic.clone(),
            published: 0,
            failures: 0,
        })
    }
}

impl CountPublisher for MqttPublisher {
    fn publish(&mut self, message: &CountMessage) -> Result<()> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| anyhow!("MQTT publisher already disconnected"))?;
        let payload = message.to_payload()?;
        match runtime
            .client
            .try_publish(self.topic.as_str(), QoS::AtMostOnce, false, payload)
        {
            Ok(()) => {
                self.published += 1;
                Ok(())
            }
            Err(e) => {
                self.failures += 1;
                Err(anyhow!(
                    "MQTT publish to '{}' failed ({} so far): {}",
                    self.topic,
                    self.failures,
                    e
                ))
            }
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        match self.runtime.take() {
            Some(runtime) => {
                log::info!(
                    "disconnecting from MQTT broker ({} messages published)",
                    self.published
                );
                runtime.disconnect()
            }
            None => Ok(()),
        }
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::debug!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_local_person_topic() {
        let settings = MqttSettings::default();
        assert_eq!(settings.broker_addr, "127.0.0.1:3001");
        assert_eq!(settings.topic, "person");
        assert!(!settings.use_tls);
    }

    #[test]
    fn connect_rejects_invalid_settings() {
        let settings = MqttSettings {
            broker_addr: "no-port".to_string(),
            ..MqttSettings::default()
        };
        assert!(MqttPublisher::connect(&settings).is_err());

        let settings = MqttSettings {
            topic: " ".to_string(),
            ..MqttSettings::default()
        };
        assert!(MqttPublisher::connect(&settings).is_err());
    }
}
