mod pipeline;
mod result;
mod runner;
mod threshold;

pub use pipeline::VisionPipeline;
pub use result::DetectionResult;
pub use runner::PipelineRunner;
pub use threshold::{ColorRange, ColorThresholdPipeline, ThresholdSettings};
