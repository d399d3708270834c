//! Layered configuration for the counter.
//!
//! Sources are applied in order, later ones winning:
//! 1. built-in defaults
//! 2. config file (`--config` or `COUNTER_CONFIG`; `.toml` is TOML, anything
//!    else JSON)
//! 3. `COUNTER_*` environment variables
//! 4. command-line flags (`ConfigOverrides`)
//!
//! `validate` runs once after the last layer.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::detect::{
    Device, InputShape, LoadOptions, PersonFilter, DEFAULT_INPUT_HEIGHT, DEFAULT_INPUT_WIDTH,
    DEFAULT_PERSON_CLASS_ID, DEFAULT_PROB_THRESHOLD,
};
use crate::ingest::{InputKind, SourceConfig};
use crate::tracker::{TieBreak, TrackerConfig, DEFAULT_WINDOW_SIZE, MAX_WINDOW_SIZE};
use crate::transport::{parse_mqtt_endpoint, MqttSettings};
use crate::transport::video::STDOUT_TARGET;

pub const CONFIG_ENV: &str = "COUNTER_CONFIG";

const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
/// Frame rate of the original counting demo.
const DEFAULT_SOURCE_FPS: u32 = 10;

#[derive(Debug, Deserialize, Default)]
struct CounterConfigFile {
    model: Option<String>,
    input: Option<String>,
    device: Option<String>,
    video_out: Option<String>,
    max_frames: Option<u64>,
    detection: Option<DetectionConfigFile>,
    tracker: Option<TrackerConfigFile>,
    mqtt: Option<MqttConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    prob_threshold: Option<f32>,
    person_class_id: Option<u32>,
    input_width: Option<usize>,
    input_height: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    window_size: Option<usize>,
    tie_break: Option<TieBreak>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    enabled: Option<bool>,
    broker_addr: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    use_tls: Option<bool>,
    tls_ca_path: Option<PathBuf>,
    topic: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    dropout: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub filter: PersonFilter,
    pub input_width: usize,
    pub input_height: usize,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub dropout: f64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    /// Model URL or path; required.
    pub model: String,
    /// Input URL, path, or camera index; required.
    pub input: String,
    pub device: Device,
    pub detection: DetectionSettings,
    pub tracker: TrackerConfig,
    pub mqtt_enabled: bool,
    pub mqtt: MqttSettings,
    pub video_out: String,
    pub max_frames: Option<u64>,
    pub source: SourceSettings,
}

/// Values given on the command line. `None` keeps the lower layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub input: Option<String>,
    pub device: Option<String>,
    pub prob_threshold: Option<f32>,
    pub person_class_id: Option<u32>,
    pub window_size: Option<usize>,
    pub tie_break: Option<TieBreak>,
    pub mqtt_broker_addr: Option<String>,
    pub mqtt_client_id: Option<String>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_use_tls: bool,
    pub mqtt_tls_ca_path: Option<PathBuf>,
    pub no_mqtt: bool,
    pub video_out: Option<String>,
    pub max_frames: Option<u64>,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            input: String::new(),
            device: Device::default(),
            detection: DetectionSettings {
                filter: PersonFilter::default(),
                input_width: DEFAULT_INPUT_WIDTH,
                input_height: DEFAULT_INPUT_HEIGHT,
            },
            tracker: TrackerConfig::default(),
            mqtt_enabled: true,
            mqtt: MqttSettings::default(),
            video_out: STDOUT_TARGET.to_string(),
            max_frames: None,
            source: SourceSettings {
                width: DEFAULT_SOURCE_WIDTH,
                height: DEFAULT_SOURCE_HEIGHT,
                target_fps: DEFAULT_SOURCE_FPS,
                dropout: 0.0,
                seed: 0,
            },
        }
    }
}

impl CounterConfig {
    /// Defaults, then the config file (explicit path or `COUNTER_CONFIG`),
    /// then the environment. Not yet validated.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let env_path = env_value(CONFIG_ENV).map(PathBuf::from);
        let path = config_path.map(Path::to_path_buf).or(env_path);
        let file_cfg = match path.as_deref() {
            Some(path) => read_config_file(path)?,
            None => CounterConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(model) = file.model {
            cfg.model = model;
        }
        if let Some(input) = file.input {
            cfg.input = input;
        }
        if let Some(device) = file.device {
            cfg.device = device.parse()?;
        }
        if let Some(video_out) = file.video_out {
            cfg.video_out = video_out;
        }
        cfg.max_frames = file.max_frames;

        let detection = file.detection.unwrap_or_default();
        cfg.detection.filter = PersonFilter {
            class_id: detection.person_class_id.unwrap_or(DEFAULT_PERSON_CLASS_ID),
            threshold: detection.prob_threshold.unwrap_or(DEFAULT_PROB_THRESHOLD),
        };
        cfg.detection.input_width = detection.input_width.unwrap_or(DEFAULT_INPUT_WIDTH);
        cfg.detection.input_height = detection.input_height.unwrap_or(DEFAULT_INPUT_HEIGHT);

        let tracker = file.tracker.unwrap_or_default();
        cfg.tracker = TrackerConfig {
            window_size: tracker.window_size.unwrap_or(DEFAULT_WINDOW_SIZE),
            tie_break: tracker.tie_break.unwrap_or_default(),
        };

        if let Some(mqtt) = file.mqtt {
            cfg.mqtt_enabled = mqtt.enabled.unwrap_or(true);
            if let Some(addr) = mqtt.broker_addr {
                cfg.mqtt.broker_addr = addr;
            }
            if let Some(client_id) = mqtt.client_id {
                cfg.mqtt.client_id = client_id;
            }
            cfg.mqtt.username = mqtt.username;
            cfg.mqtt.password = mqtt.password;
            cfg.mqtt.use_tls = mqtt.use_tls.unwrap_or(false);
            cfg.mqtt.tls_ca_path = mqtt.tls_ca_path;
            if let Some(topic) = mqtt.topic {
                cfg.mqtt.topic = topic;
            }
        }

        let source = file.source.unwrap_or_default();
        cfg.source = SourceSettings {
            width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            dropout: source.dropout.unwrap_or(0.0),
            seed: source.seed.unwrap_or(0),
        };
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(model) = env_value("COUNTER_MODEL") {
            self.model = model;
        }
        if let Some(input) = env_value("COUNTER_INPUT") {
            self.input = input;
        }
        if let Some(device) = env_value("COUNTER_DEVICE") {
            self.device = device.parse()?;
        }
        if let Some(threshold) = env_parse::<f32>("COUNTER_PROB_THRESHOLD")? {
            self.detection.filter.threshold = threshold;
        }
        if let Some(class_id) = env_parse::<u32>("COUNTER_PERSON_CLASS_ID")? {
            self.detection.filter.class_id = class_id;
        }
        if let Some(window_size) = env_parse::<usize>("COUNTER_WINDOW_SIZE")? {
            self.tracker.window_size = window_size;
        }
        if let Some(tie_break) = env_value("COUNTER_TIE_BREAK") {
            self.tracker.tie_break = tie_break.parse()?;
        }
        if let Some(addr) = env_value("COUNTER_MQTT_BROKER_ADDR") {
            self.mqtt.broker_addr = addr;
        }
        if let Some(client_id) = env_value("COUNTER_MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(username) = env_value("COUNTER_MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = env_value("COUNTER_MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        if let Some(use_tls) = env_bool("COUNTER_MQTT_USE_TLS")? {
            self.mqtt.use_tls = use_tls;
        }
        if let Some(path) = env_value("COUNTER_MQTT_TLS_CA_PATH") {
            self.mqtt.tls_ca_path = Some(PathBuf::from(path));
        }
        if let Some(no_mqtt) = env_bool("COUNTER_NO_MQTT")? {
            self.mqtt_enabled = !no_mqtt;
        }
        if let Some(video_out) = env_value("COUNTER_VIDEO_OUT") {
            self.video_out = video_out;
        }
        if let Some(max_frames) = env_parse::<u64>("COUNTER_MAX_FRAMES")? {
            self.max_frames = Some(max_frames);
        }
        if let Some(dropout) = env_parse::<f64>("COUNTER_DROPOUT")? {
            self.source.dropout = dropout;
        }
        if let Some(seed) = env_parse::<u64>("COUNTER_SEED")? {
            self.source.seed = seed;
        }
        Ok(())
    }

    /// Apply command-line values on top of the file and environment layers.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(model) = overrides.model {
            self.model = model;
        }
        if let Some(input) = overrides.input {
            self.input = input;
        }
        if let Some(device) = overrides.device {
            self.device = device.parse()?;
        }
        if let Some(threshold) = overrides.prob_threshold {
            self.detection.filter.threshold = threshold;
        }
        if let Some(class_id) = overrides.person_class_id {
            self.detection.filter.class_id = class_id;
        }
        if let Some(window_size) = overrides.window_size {
            self.tracker.window_size = window_size;
        }
        if let Some(tie_break) = overrides.tie_break {
            self.tracker.tie_break = tie_break;
        }
        if let Some(addr) = overrides.mqtt_broker_addr {
            self.mqtt.broker_addr = addr;
        }
        if let Some(client_id) = overrides.mqtt_client_id {
            self.mqtt.client_id = client_id;
        }
        if overrides.mqtt_username.is_some() {
            self.mqtt.username = overrides.mqtt_username;
        }
        if overrides.mqtt_password.is_some() {
            self.mqtt.password = overrides.mqtt_password;
        }
        if overrides.mqtt_use_tls {
            self.mqtt.use_tls = true;
        }
        if overrides.mqtt_tls_ca_path.is_some() {
            self.mqtt.tls_ca_path = overrides.mqtt_tls_ca_path;
        }
        if overrides.no_mqtt {
            self.mqtt_enabled = false;
        }
        if let Some(video_out) = overrides.video_out {
            self.video_out = video_out;
        }
        if overrides.max_frames.is_some() {
            self.max_frames = overrides.max_frames;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        self.model = self.model.trim().to_string();
        if self.model.is_empty() {
            return Err(anyhow!("a model is required (--model or COUNTER_MODEL)"));
        }
        self.input = self.input.trim().to_string();
        if self.input.is_empty() {
            return Err(anyhow!("an input is required (--input or COUNTER_INPUT)"));
        }
        InputKind::classify(&self.input)?;

        let threshold = self.detection.filter.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "probability threshold must be within 0..=1 (got {})",
                threshold
            ));
        }
        if self.detection.input_width == 0 || self.detection.input_height == 0 {
            return Err(anyhow!("network input size must be non-zero"));
        }
        if self.tracker.window_size == 0 {
            return Err(anyhow!("window size must be at least 1"));
        }
        if self.tracker.window_size > MAX_WINDOW_SIZE {
            return Err(anyhow!(
                "window size must be at most {} (got {})",
                MAX_WINDOW_SIZE,
                self.tracker.window_size
            ));
        }
        if !(0.0..=1.0).contains(&self.source.dropout) {
            return Err(anyhow!(
                "dropout must be within 0..=1 (got {})",
                self.source.dropout
            ));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source frame size must be non-zero"));
        }
        if self.max_frames == Some(0) {
            return Err(anyhow!("max frames must be greater than zero"));
        }
        if self.video_out.trim().is_empty() {
            self.video_out = STDOUT_TARGET.to_string();
        }

        if self.mqtt_enabled {
            parse_mqtt_endpoint(&self.mqtt.broker_addr, self.mqtt.use_tls)
                .with_context(|| format!("invalid MQTT broker '{}'", self.mqtt.broker_addr))?;
            if self.mqtt.client_id.trim().is_empty() {
                return Err(anyhow!("MQTT client id must not be empty"));
            }
            if self.mqtt.password.is_some() && self.mqtt.username.is_none() {
                return Err(anyhow!("MQTT password given without a username"));
            }
        }
        Ok(())
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            input: self.input.clone(),
            width: self.source.width,
            height: self.source.height,
            target_fps: self.source.target_fps,
            max_frames: self.max_frames,
            dropout: self.source.dropout,
            seed: self.source.seed,
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            input: InputShape::rgb(self.detection.input_width, self.detection.input_height),
            person_class_id: self.detection.filter.class_id,
        }
    }
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_value(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match env_value(key).map(|v| v.to_lowercase()) {
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(anyhow!("{} must be a boolean (got '{}')", key, v)),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CounterConfig {
        CounterConfig {
            model: "stub://luma".to_string(),
            input: "stub://walkers".to_string(),
            ..CounterConfig::default()
        }
    }

    #[test]
    fn defaults_match_the_demo() {
        let cfg = CounterConfig::default();
        assert_eq!(cfg.device, Device::Cpu);
        assert_eq!(cfg.detection.filter.threshold, 0.5);
        assert_eq!(cfg.detection.filter.class_id, 1);
        assert_eq!(cfg.tracker.window_size, 10);
        assert_eq!(cfg.mqtt.broker_addr, "127.0.0.1:3001");
        assert_eq!(cfg.video_out, "-");
        assert!(cfg.mqtt_enabled);
    }

    #[test]
    fn validate_requires_model_and_input() {
        let mut cfg = CounterConfig::default();
        assert!(cfg.validate().unwrap_err().to_string().contains("model"));
        cfg.model = "stub://luma".to_string();
        assert!(cfg.validate().unwrap_err().to_string().contains("input"));
        cfg.input = "0".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = valid();
        cfg.detection.filter.threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.tracker.window_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.tracker.window_size = 1_000_000_000;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("at most"));

        let mut cfg = valid();
        cfg.mqtt.broker_addr = "localhost".to_string();
        assert!(cfg.validate().is_err());
        cfg.mqtt_enabled = false;
        assert!(cfg.validate().is_ok());

        let mut cfg = valid();
        cfg.max_frames = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_replace_only_given_values() -> Result<()> {
        let mut cfg = valid();
        cfg.apply_overrides(ConfigOverrides {
            device: Some("hetero:fpga,cpu".to_string()),
            window_size: Some(5),
            no_mqtt: true,
            ..ConfigOverrides::default()
        })?;
        assert_eq!(cfg.model, "stub://luma");
        assert_eq!(cfg.tracker.window_size, 5);
        assert!(!cfg.mqtt_enabled);
        assert!(cfg.device.includes(&Device::Cpu));
        Ok(())
    }
}
