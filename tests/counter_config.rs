use std::io::Write;
use std::sync::Mutex;

use tempfile::Builder;

use people_counter::config::{ConfigOverrides, CounterConfig};
use people_counter::{Device, TieBreak};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "COUNTER_CONFIG",
        "COUNTER_MODEL",
        "COUNTER_INPUT",
        "COUNTER_DEVICE",
        "COUNTER_PROB_THRESHOLD",
        "COUNTER_PERSON_CLASS_ID",
        "COUNTER_WINDOW_SIZE",
        "COUNTER_TIE_BREAK",
        "COUNTER_MQTT_BROKER_ADDR",
        "COUNTER_MQTT_CLIENT_ID",
        "COUNTER_MQTT_USERNAME",
        "COUNTER_MQTT_PASSWORD",
        "COUNTER_MQTT_USE_TLS",
        "COUNTER_MQTT_TLS_CA_PATH",
        "COUNTER_NO_MQTT",
        "COUNTER_VIDEO_OUT",
        "COUNTER_MAX_FRAMES",
        "COUNTER_DROPOUT",
        "COUNTER_SEED",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_toml_file_with_env_and_cli_layers() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        model = "stub://luma"
        input = "stub://lobby"
        device = "HETERO:FPGA,CPU"
        video_out = "none"

        [detection]
        prob_threshold = 0.6
        person_class_id = 15

        [tracker]
        window_size = 8
        tie_break = "lowest"

        [mqtt]
        broker_addr = "mqtt://broker.local:1883"
        client_id = "lobby-counter"

        [source]
        dropout = 0.1
        seed = 7
    "#;
    file.write_all(toml.as_bytes()).expect("write config");

    std::env::set_var("COUNTER_CONFIG", file.path());
    std::env::set_var("COUNTER_WINDOW_SIZE", "12");
    std::env::set_var("COUNTER_MQTT_BROKER_ADDR", "127.0.0.1:3001");

    let mut cfg = CounterConfig::load(None).expect("load config");
    cfg.apply_overrides(ConfigOverrides {
        prob_threshold: Some(0.7),
        max_frames: Some(100),
        ..ConfigOverrides::default()
    })
    .expect("apply overrides");
    cfg.validate().expect("valid config");

    assert_eq!(cfg.model, "stub://luma");
    assert_eq!(cfg.input, "stub://lobby");
    assert_eq!(cfg.device, Device::Hetero(vec![Device::Fpga, Device::Cpu]));
    assert_eq!(cfg.video_out, "none");
    assert_eq!(cfg.detection.filter.class_id, 15);
    assert_eq!(cfg.detection.filter.threshold, 0.7);
    assert_eq!(cfg.tracker.window_size, 12);
    assert_eq!(cfg.tracker.tie_break, TieBreak::Lowest);
    assert_eq!(cfg.mqtt.broker_addr, "127.0.0.1:3001");
    assert_eq!(cfg.mqtt.client_id, "lobby-counter");
    assert_eq!(cfg.max_frames, Some(100));

    let source = cfg.source_config();
    assert_eq!(source.dropout, 0.1);
    assert_eq!(source.seed, 7);
    assert_eq!(source.max_frames, Some(100));

    clear_env();
}

#[test]
fn explicit_json_path_wins_over_env_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut json_file = Builder::new().suffix(".json").tempfile().expect("temp");
    json_file
        .write_all(br#"{ "model": "models/person.onnx", "input": "0", "mqtt": { "enabled": false } }"#)
        .expect("write config");
    std::env::set_var("COUNTER_CONFIG", "/nonexistent/counter.toml");

    let mut cfg = CounterConfig::load(Some(json_file.path())).expect("load config");
    cfg.validate().expect("valid config");
    assert_eq!(cfg.model, "models/person.onnx");
    assert_eq!(cfg.input, "0");
    assert!(!cfg.mqtt_enabled);

    clear_env();
}

#[test]
fn invalid_env_values_are_reported() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COUNTER_WINDOW_SIZE", "ten");
    let err = CounterConfig::load(None).unwrap_err();
    assert!(err.to_string().contains("COUNTER_WINDOW_SIZE"));
    clear_env();

    std::env::set_var("COUNTER_NO_MQTT", "maybe");
    assert!(CounterConfig::load(None).is_err());
    clear_env();

    std::env::set_var("COUNTER_DEVICE", "TPU");
    assert!(CounterConfig::load(None).is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COUNTER_CONFIG", "/nonexistent/counter.json");
    let err = CounterConfig::load(None).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
