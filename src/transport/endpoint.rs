//! MQTT broker addressing and TLS transport selection.

use anyhow::{anyhow, Context, Result};
use rumqttc::Transport;
use std::path::Path;

/// Default broker of the counting service.
pub const DEFAULT_MQTT_BROKER: &str = "127.0.0.1:3001";

/// MQTT endpoint with TLS configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// TLS certificate materials for MQTT connections.
#[derive(Clone, Debug, Default)]
pub struct TlsMaterials {
    /// PEM-encoded CA certificate bytes.
    /// When None, the default webpki roots are used.
    pub ca: Option<Vec<u8>>,
}

impl TlsMaterials {
    pub fn load(ca_path: Option<&Path>) -> Result<Self> {
        let ca = match ca_path {
            Some(path) => Some(
                std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA '{}'", path.display()))?,
            ),
            None => None,
        };
        Ok(Self { ca })
    }

    pub fn is_configured(&self) -> bool {
        self.ca.is_some()
    }
}

/// Parse `host:port`, `[v6]:port`, or a `mqtt://`/`mqtts://` URL.
///
/// `mqtts://` and `ssl://` force TLS; `tls_override` enables it for any scheme.
pub fn parse_mqtt_endpoint(addr: &str, tls_override: bool) -> Result<MqttEndpoint> {
    let mut use_tls = tls_override;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

/// Build the rumqttc transport for `endpoint`.
///
/// Fails if TLS materials were supplied for a plain-TCP endpoint.
pub fn build_transport(endpoint: &MqttEndpoint, tls: &TlsMaterials) -> Result<Transport> {
    if !endpoint.use_tls {
        if tls.is_configured() {
            return Err(anyhow!(
                "MQTT TLS materials provided but TLS is disabled.\n\
                 Use --mqtt-use-tls or mqtts:// scheme to enable TLS."
            ));
        }
        return Ok(Transport::tcp());
    }
    match &tls.ca {
        None => Ok(Transport::tls_with_default_config()),
        Some(ca) => Ok(Transport::tls(ca.clone(), None, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoint_plain() {
        let ep = parse_mqtt_endpoint(DEFAULT_MQTT_BROKER, false).unwrap();
        assert_eq!(ep.host, "127.0.0.1");
        assert_eq!(ep.port, 3001);
        assert!(!ep.use_tls);
    }

    #[test]
    fn parse_endpoint_mqtts_scheme() {
        let ep = parse_mqtt_endpoint("mqtts://broker.example.com:8883", false).unwrap();
        assert_eq!(ep.host, "broker.example.com");
        assert_eq!(ep.port, 8883);
        assert!(ep.use_tls);
    }

    #[test]
    fn parse_endpoint_tls_override() {
        let ep = parse_mqtt_endpoint("mqtt://127.0.0.1:8883", true).unwrap();
        assert!(ep.use_tls);
    }

    #[test]
    fn parse_endpoint_ipv6() {
        let ep = parse_mqtt_endpoint("[::1]:1883", false).unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, 1883);
    }

    #[test]
    fn parse_endpoint_rejects_bad_input() {
        assert!(parse_mqtt_endpoint("ws://broker:80", false).is_err());
        assert!(parse_mqtt_endpoint("broker", false).is_err());
        assert!(parse_mqtt_endpoint("broker:notaport", false).is_err());
        assert!(parse_mqtt_endpoint(":1883", false).is_err());
    }

    #[test]
    fn tls_materials_need_tls_enabled() {
        let ep = parse_mqtt_endpoint("localhost:1883", false).unwrap();
        let tls = TlsMaterials {
            ca: Some(b"-----BEGIN CERTIFICATE-----".to_vec()),
        };
        let err = build_transport(&ep, &tls)
            .err()
            .expect("plain TCP with a CA must fail");
        assert!(err.to_string().contains("TLS is disabled"));
        assert!(build_transport(&ep, &TlsMaterials::default()).is_ok());
    }

    #[test]
    fn missing_ca_file_is_reported() {
        let err = TlsMaterials::load(Some(Path::new("/nonexistent/ca.pem"))).unwrap_err();
        assert!(err.to_string().contains("MQTT TLS CA"));
    }
}
