use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::annotate::RectStyle;
use crate::detect::{ColorRange, ThresholdSettings};
use crate::telemetry::MqttSettings;
use crate::vision::FailurePolicy;

const DEFAULT_CAMERA_URL: &str = "stub://camera";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_WIDTH: u32 = 320;
const DEFAULT_CAMERA_HEIGHT: u32 = 240;
const DEFAULT_TELEMETRY_KEY: &str = "BallPosition";
const DEFAULT_STREAM_ADDR: &str = "127.0.0.1:1181";
const DEFAULT_JPEG_QUALITY: u8 = 75;
const DEFAULT_RESTART_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize, Default)]
struct BridgeConfigFile {
    camera: Option<CameraConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    annotation: Option<AnnotationConfigFile>,
    telemetry: Option<TelemetryConfigFile>,
    stream: Option<StreamConfigFile>,
    on_pipeline_failure: Option<String>,
    restart_backoff_ms: Option<u64>,
    cycle_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    fail_every: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    lower_bgr: Option<[u8; 3]>,
    upper_bgr: Option<[u8; 3]>,
    min_area: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotationConfigFile {
    color_bgr: Option<[u8; 3]>,
    thickness: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TelemetryConfigFile {
    key: Option<String>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker: Option<String>,
    client_id: Option<String>,
    topic_prefix: Option<String>,
    username: Option<String>,
    password: Option<String>,
    use_tls: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    addr: Option<String>,
    enabled: Option<bool>,
    jpeg_quality: Option<u8>,
}

/// Wiring parameters for the bridge binary.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub camera: SourceSettings,
    pub pipeline: ThresholdSettings,
    pub style: RectStyle,
    pub telemetry_key: String,
    /// `None` keeps telemetry in the process-wide in-memory store.
    pub mqtt: Option<MqttSettings>,
    /// `None` disables the stream server.
    pub stream_addr: Option<String>,
    pub jpeg_quality: u8,
    pub failure_policy: FailurePolicy,
    pub cycle_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Synthetic sources only: fail every Nth grab (0 = never).
    pub fail_every: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_CAMERA_URL.to_string(),
            target_fps: DEFAULT_CAMERA_FPS,
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            fail_every: 0,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            camera: SourceSettings::default(),
            pipeline: ThresholdSettings::default(),
            style: RectStyle::default(),
            telemetry_key: DEFAULT_TELEMETRY_KEY.to_string(),
            mqtt: None,
            stream_addr: Some(DEFAULT_STREAM_ADDR.to_string()),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            failure_policy: FailurePolicy::default(),
            cycle_interval: Duration::ZERO,
        }
    }
}

impl BridgeConfig {
    /// Load from the file named by `VISION_CONFIG` (if set), apply
    /// environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BridgeConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera = SourceSettings {
            url: camera_file
                .url
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            fail_every: camera_file.fail_every.unwrap_or(0),
        };

        let defaults = ThresholdSettings::default();
        let pipeline = match file.pipeline {
            Some(p) => ThresholdSettings {
                range: ColorRange {
                    lower: p.lower_bgr.unwrap_or(defaults.range.lower),
                    upper: p.upper_bgr.unwrap_or(defaults.range.upper),
                },
                min_area: p.min_area.unwrap_or(defaults.min_area),
            },
            None => defaults,
        };

        let default_style = RectStyle::default();
        let style = match file.annotation {
            Some(a) => RectStyle {
                color: a.color_bgr.unwrap_or(default_style.color),
                thickness: a.thickness.unwrap_or(default_style.thickness),
            },
            None => default_style,
        };

        let telemetry = file.telemetry.unwrap_or_default();
        let telemetry_key = telemetry
            .key
            .unwrap_or_else(|| DEFAULT_TELEMETRY_KEY.to_string());
        let mqtt = telemetry.mqtt.map(|m| {
            let defaults = MqttSettings::default();
            MqttSettings {
                broker: m.broker.unwrap_or(defaults.broker),
                client_id: m.client_id.unwrap_or(defaults.client_id),
                topic_prefix: m.topic_prefix.unwrap_or(defaults.topic_prefix),
                username: m.username,
                password: m.password,
                use_tls: m.use_tls.unwrap_or(false),
            }
        });

        let stream = file.stream.unwrap_or_default();
        let stream_addr = if stream.enabled.unwrap_or(true) {
            Some(
                stream
                    .addr
                    .unwrap_or_else(|| DEFAULT_STREAM_ADDR.to_string()),
            )
        } else {
            None
        };

        let failure_policy = match file.on_pipeline_failure.as_deref() {
            Some(value) => value.parse()?,
            None => FailurePolicy::default(),
        };
        let failure_policy = with_backoff(
            failure_policy,
            file.restart_backoff_ms.unwrap_or(DEFAULT_RESTART_BACKOFF_MS),
        );

        Ok(Self {
            camera,
            pipeline,
            style,
            telemetry_key,
            mqtt,
            stream_addr,
            jpeg_quality: stream.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            failure_policy,
            cycle_interval: Duration::from_millis(file.cycle_interval_ms.unwrap_or(0)),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("VISION_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(key) = std::env::var("VISION_TELEMETRY_KEY") {
            if !key.trim().is_empty() {
                self.telemetry_key = key;
            }
        }
        if let Ok(broker) = std::env::var("VISION_MQTT_BROKER") {
            if !broker.trim().is_empty() {
                let mut mqtt = self.mqtt.take().unwrap_or_default();
                mqtt.broker = broker;
                self.mqtt = Some(mqtt);
            }
        }
        if let Ok(addr) = std::env::var("VISION_STREAM_ADDR") {
            if !addr.trim().is_empty() {
                self.stream_addr = Some(addr);
            }
        }
        if let Ok(policy) = std::env::var("VISION_ON_PIPELINE_FAILURE") {
            let backoff = match self.failure_policy {
                FailurePolicy::Restart { backoff } => backoff.as_millis() as u64,
                FailurePolicy::Terminate => DEFAULT_RESTART_BACKOFF_MS,
            };
            self.failure_policy = with_backoff(policy.parse()?, backoff);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.telemetry_key.trim().is_empty() {
            return Err(anyhow!("telemetry key must not be empty"));
        }
        if self.telemetry_key.contains(['/', '#', '+']) {
            return Err(anyhow!(
                "telemetry key '{}' must not contain '/', '#' or '+'",
                self.telemetry_key
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.style.thickness == 0 {
            return Err(anyhow!("annotation thickness must be greater than zero"));
        }
        for c in 0..3 {
            if self.pipeline.range.lower[c] > self.pipeline.range.upper[c] {
                return Err(anyhow!(
                    "pipeline lower_bgr must not exceed upper_bgr (channel {})",
                    c
                ));
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be within 1..=100"));
        }
        Ok(())
    }
}

fn with_backoff(policy: FailurePolicy, backoff_ms: u64) -> FailurePolicy {
    match policy {
        FailurePolicy::Restart { .. } => FailurePolicy::Restart {
            backoff: Duration::from_millis(backoff_ms),
        },
        FailurePolicy::Terminate => FailurePolicy::Terminate,
    }
}

fn read_config_file(path: &Path) -> Result<BridgeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
