//! vision_bridge - perception-to-telemetry bridge daemon
//!
//! This daemon:
//! 1. Opens the camera once and shares it between the pipeline and the annotator
//! 2. Runs the detection consumer loop on a detached background thread
//! 3. Publishes the first detected target under a fixed telemetry key
//! 4. Serves the annotated stream over HTTP/MJPEG
//!
//! The vision thread is never joined. On Ctrl-C (or after `--seconds`) main
//! returns and the process exits with the thread still running.

use anyhow::Result;
use clap::Parser;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use vision_bridge::{
    open_source, Annotator, BridgeConfig, ColorThresholdPipeline, FailurePolicy,
    InMemoryTelemetryStore, LatestFrameSink, MqttTelemetryStore, NullSink, PipelineRunner,
    SharedSource, StreamServer, TelemetryPublisher, TelemetryStore, VideoSink, VisionApplication,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Annotate detections on the camera stream and publish target telemetry"
)]
struct Args {
    /// Camera URL (stub://name for synthetic frames, /dev/videoN with ingest-v4l2).
    #[arg(long, env = "VISION_CAMERA_URL")]
    camera: Option<String>,

    /// Telemetry key the target rectangle is written under.
    #[arg(long, env = "VISION_TELEMETRY_KEY")]
    telemetry_key: Option<String>,

    /// MQTT broker for telemetry (in-process store when unset).
    #[arg(long, env = "VISION_MQTT_BROKER")]
    mqtt_broker: Option<String>,

    /// Stream server bind address.
    #[arg(long, env = "VISION_STREAM_ADDR")]
    stream_addr: Option<String>,

    /// Disable the stream server.
    #[arg(long)]
    no_stream: bool,

    /// Pipeline failure policy (terminate|restart).
    #[arg(long, env = "VISION_ON_PIPELINE_FAILURE", value_name = "POLICY")]
    on_pipeline_failure: Option<FailurePolicy>,

    /// Exit after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    seconds: Option<u64>,
}

impl Args {
    fn apply(&self, cfg: &mut BridgeConfig) {
        if let Some(camera) = &self.camera {
            cfg.camera.url = camera.clone();
        }
        if let Some(key) = &self.telemetry_key {
            cfg.telemetry_key = key.clone();
        }
        if let Some(broker) = &self.mqtt_broker {
            let mut mqtt = cfg.mqtt.take().unwrap_or_default();
            mqtt.broker = broker.clone();
            cfg.mqtt = Some(mqtt);
        }
        if let Some(addr) = &self.stream_addr {
            cfg.stream_addr = Some(addr.clone());
        }
        if self.no_stream {
            cfg.stream_addr = None;
        }
        if let Some(policy) = self.on_pipeline_failure {
            cfg.failure_policy = match (policy, cfg.failure_policy) {
                (FailurePolicy::Restart { .. }, FailurePolicy::Restart { backoff }) => {
                    FailurePolicy::Restart { backoff }
                }
                (policy, _) => policy,
            };
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = BridgeConfig::load()?;
    args.apply(&mut cfg);

    let mqtt = match &cfg.mqtt {
        Some(settings) => Some(Arc::new(MqttTelemetryStore::connect(settings)?)),
        None => None,
    };
    let store: Arc<dyn TelemetryStore> = match &mqtt {
        Some(mqtt) => mqtt.clone(),
        None => {
            log::info!("telemetry: in-process store (no MQTT broker configured)");
            Arc::new(InMemoryTelemetryStore::global().clone())
        }
    };

    let latest = LatestFrameSink::new(cfg.jpeg_quality);
    let stream_handle = match &cfg.stream_addr {
        Some(addr) => {
            let handle = StreamServer::new(addr.clone(), latest.clone()).spawn()?;
            log::info!("stream server listening on http://{}/stream.mjpg", handle.addr);
            Some(handle)
        }
        None => None,
    };
    let sink: Box<dyn VideoSink> = if stream_handle.is_some() {
        Box::new(latest)
    } else {
        Box::new(NullSink)
    };

    let camera = SharedSource::new(open_source(&cfg.camera)?);
    let runner = PipelineRunner::new(
        camera.clone(),
        ColorThresholdPipeline::new(cfg.pipeline.clone()),
    );
    let annotator = Annotator::new(
        camera,
        sink,
        TelemetryPublisher::new(store, cfg.telemetry_key.clone()),
        cfg.style,
    );

    let vision = VisionApplication::new(runner, annotator)
        .with_failure_policy(cfg.failure_policy)
        .with_cycle_interval(cfg.cycle_interval)
        .start()?;

    log::info!(
        "vision_bridge running. camera={} telemetry_key={} on_pipeline_failure={:?}",
        cfg.camera.url,
        cfg.telemetry_key,
        cfg.failure_policy
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    match args.seconds {
        Some(seconds) => {
            let _ = rx.recv_timeout(Duration::from_secs(seconds));
        }
        None => {
            log::info!("vision_bridge waiting for shutdown signal (Ctrl-C)...");
            let _ = rx.recv();
        }
    }

    let stats = vision.stats();
    log::info!(
        "shutting down: vision thread running={} cycles={} detections={} frame_misses={} pipeline_failures={}",
        vision.is_running(),
        stats.cycles(),
        stats.detections(),
        stats.frame_misses(),
        stats.pipeline_failures()
    );
    if let Some(handle) = stream_handle {
        handle.stop()?;
    }
    if let Some(mqtt) = mqtt {
        if let Err(err) = mqtt.disconnect() {
            log::warn!("telemetry: MQTT disconnect failed: {:#}", err);
        }
    }
    // The vision thread is left running; process exit ends it.
    Ok(())
}
