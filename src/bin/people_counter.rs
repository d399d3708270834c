//! people_counter - count people in a video feed
//!
//! Reads frames from a synthetic scene, video file, or camera, counts the
//! people the detector finds, publishes `{"count", "total"}` to the MQTT
//! topic `person`, and writes annotated raw RGB24 frames to stdout (or the
//! `--video-out` target) for a downstream encoder, e.g.
//!
//! ```text
//! people_counter -m stub://luma -i stub://walkers \
//!   | ffmpeg -f rawvideo -pixel_format rgb24 -video_size 640x480 -i - out.mp4
//! ```
//!
//! Exit status: 0 on success, 2 when the model cannot run on the requested
//! device or contains unsupported layers, 1 for any other failure.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use people_counter::config::{ConfigOverrides, CounterConfig};
use people_counter::transport::video::STDOUT_TARGET;
use people_counter::{
    load_engine, open_source, CountPublisher, CountingPipeline, EngineError, MqttPublisher,
    NullPublisher, PipelineOptions, TieBreak, VideoSink,
};

#[path = "../ui.rs"]
mod ui;

/// Seconds after a second Ctrl-C request before the process is killed.
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Count people in a video feed and publish the counts over MQTT"
)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "COUNTER_CONFIG")]
    config: Option<PathBuf>,

    /// Model to run: stub://luma, stub://scripted, or a path to an .onnx file.
    #[arg(short = 'm', long, env = "COUNTER_MODEL")]
    model: Option<String>,

    /// Input: stub://<scene>, a video file, a camera index, or /dev/videoN.
    #[arg(short = 'i', long, env = "COUNTER_INPUT")]
    input: Option<String>,

    /// Target device: CPU, GPU, MYRIAD, FPGA, NPU or HETERO:<list>.
    #[arg(short = 'd', long, env = "COUNTER_DEVICE")]
    device: Option<String>,

    /// Minimum confidence for a detection to count as a person.
    #[arg(short = 'p', long = "prob-threshold", env = "COUNTER_PROB_THRESHOLD")]
    prob_threshold: Option<f32>,

    /// Class id of people in the model's label map.
    #[arg(long, env = "COUNTER_PERSON_CLASS_ID")]
    person_class_id: Option<u32>,

    /// Number of recent frames the current count is smoothed over.
    #[arg(long, env = "COUNTER_WINDOW_SIZE")]
    window_size: Option<usize>,

    /// Rule for equally frequent counts in the window (first-seen|lowest).
    #[arg(long, env = "COUNTER_TIE_BREAK")]
    tie_break: Option<TieBreak>,

    /// MQTT broker address (host:port or mqtt[s]://host:port).
    #[arg(long, env = "COUNTER_MQTT_BROKER_ADDR")]
    mqtt_broker_addr: Option<String>,

    /// MQTT client identifier.
    #[arg(long, env = "COUNTER_MQTT_CLIENT_ID")]
    mqtt_client_id: Option<String>,

    /// MQTT username for authentication.
    #[arg(long, env = "COUNTER_MQTT_USERNAME")]
    mqtt_username: Option<String>,

    /// MQTT password for authentication.
    #[arg(long, env = "COUNTER_MQTT_PASSWORD")]
    mqtt_password: Option<String>,

    /// Enable TLS for MQTT (implied by mqtts:// brokers).
    #[arg(long, env = "COUNTER_MQTT_USE_TLS")]
    mqtt_use_tls: bool,

    /// Path to a PEM-encoded CA certificate to trust for MQTT TLS.
    #[arg(long, env = "COUNTER_MQTT_TLS_CA_PATH")]
    mqtt_tls_ca_path: Option<PathBuf>,

    /// Do not publish counts.
    #[arg(long, env = "COUNTER_NO_MQTT")]
    no_mqtt: bool,

    /// Where annotated frames go: '-' for stdout, 'none', or a file path.
    #[arg(long, env = "COUNTER_VIDEO_OUT")]
    video_out: Option<String>,

    /// Stop after this many frames.
    #[arg(long, env = "COUNTER_MAX_FRAMES")]
    max_frames: Option<u64>,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            model: self.model.clone(),
            input: self.input.clone(),
            device: self.device.clone(),
            prob_threshold: self.prob_threshold,
            person_class_id: self.person_class_id,
            window_size: self.window_size,
            tie_break: self.tie_break,
            mqtt_broker_addr: self.mqtt_broker_addr.clone(),
            mqtt_client_id: self.mqtt_client_id.clone(),
            mqtt_username: self.mqtt_username.clone(),
            mqtt_password: self.mqtt_password.clone(),
            mqtt_use_tls: self.mqtt_use_tls,
            mqtt_tls_ca_path: self.mqtt_tls_ca_path.clone(),
            no_mqtt: self.no_mqtt,
            video_out: self.video_out.clone(),
            max_frames: self.max_frames,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<EngineError>() {
            Some(engine_err) if engine_err.is_fatal_load_error() => {
                log::error!("{}", engine_err);
                ExitCode::from(2)
            }
            _ => {
                log::error!("{:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

fn run(args: &Args) -> Result<()> {
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = CounterConfig::load(args.config.as_deref())?;
        cfg.apply_overrides(args.overrides())?;
        cfg.validate()?;
        cfg
    };
    if cfg.video_out == STDOUT_TARGET && stdout_is_tty {
        log::warn!("writing raw video to a terminal; pipe stdout or pass --video-out none");
    }

    let engine = {
        let _stage = ui.stage("Load model");
        load_engine(&cfg.model, cfg.device.clone(), &cfg.load_options())?
    };
    log::info!(
        "model {} ready on {} (backend {}, input {})",
        cfg.model,
        engine.device(),
        engine.name(),
        engine.input_shape()
    );

    let mut source = {
        let _stage = ui.stage("Open input");
        let mut source = open_source(&cfg.source_config())?;
        source.connect()?;
        source
    };

    let publisher: Box<dyn CountPublisher> = if cfg.mqtt_enabled {
        let _stage = ui.stage("Start MQTT client");
        Box::new(MqttPublisher::connect(&cfg.mqtt)?)
    } else {
        log::info!("MQTT publishing disabled");
        Box::new(NullPublisher)
    };
    let sink = VideoSink::open(&cfg.video_out)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            if stop.swap(true, Ordering::SeqCst) {
                log::warn!("second interrupt; exiting in {}s", FORCE_EXIT_AFTER.as_secs());
                std::thread::spawn(|| {
                    std::thread::sleep(FORCE_EXIT_AFTER);
                    std::process::exit(1);
                });
            } else {
                log::info!("interrupt received, finishing current frame");
            }
        })
        .context("install Ctrl-C handler")?;
    }

    let mut pipeline = CountingPipeline::new(
        engine,
        publisher,
        sink,
        PipelineOptions {
            tracker: cfg.tracker,
            filter: cfg.detection.filter,
            max_frames: cfg.max_frames,
        },
    )?;

    let progress = ui.frame_progress();
    let summary = pipeline.run_with(source.as_mut(), &stop, |report| {
        progress.update(
            report.index + 1,
            report.occupancy.current,
            report.occupancy.total,
        );
    })?;
    progress.finish(summary.frames, summary.current, summary.total);
    if let Some(reason) = &summary.ended_by_error {
        log::warn!("input ended early: {}", reason);
    }

    log::info!(
        "processed {} frames: {} in view, {} total ({} published, {} publish failures, {} frames written)",
        summary.frames,
        summary.current,
        summary.total,
        summary.published,
        summary.publish_failures,
        summary.frames_written
    );
    Ok(())
}
