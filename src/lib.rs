//! Vision bridge
//!
//! Consumes the output of a detection pipeline running against a live camera,
//! turns the first detected region into a bounding box, draws it on a freshly
//! grabbed frame for the video stream and publishes its coordinates to a
//! shared key/value telemetry store.
//!
//! # Module Structure
//!
//! - `frame`: reusable frame buffer and the `FrameSource` boundary
//! - `geometry`: points, candidate regions, bounding boxes
//! - `detect`: `VisionPipeline` boundary, pipeline runner, reference color-threshold pipeline
//! - `ingest`: frame sources (synthetic `stub://`, V4L2) and the shared camera handle
//! - `annotate`: grab, report, draw and forward for one detection
//! - `output`: video sinks (latest-frame JPEG slot)
//! - `stream`: HTTP/MJPEG server for the annotated stream
//! - `telemetry`: key/value stores (in-memory, MQTT) and the publisher
//! - `vision`: the detection consumer loop and its background thread
//! - `config`: wiring configuration (file + environment)

pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod output;
pub mod stream;
pub mod telemetry;
pub mod vision;

pub use annotate::{draw_rect, Annotation, Annotator, RectStyle};
pub use config::{BridgeConfig, SourceSettings};
pub use detect::{
    ColorRange, ColorThresholdPipeline, DetectionResult, PipelineRunner, ThresholdSettings,
    VisionPipeline,
};
pub use frame::{Frame, FrameSource, PixelFormat};
pub use geometry::{bounding_rect, BoundingBox, Contour, Point};
pub use ingest::{open_source, SharedSource, SyntheticConfig, SyntheticSource};
pub use output::{LatestFrameSink, NullSink, VideoSink};
pub use stream::{StreamHandle, StreamServer};
pub use telemetry::{
    InMemoryTelemetryStore, MqttSettings, MqttTelemetryStore, TelemetryPublisher, TelemetryStore,
};
pub use vision::{CycleOutcome, FailurePolicy, VisionApplication, VisionHandle, VisionStats};
