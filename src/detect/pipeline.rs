use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Detection pipeline boundary.
///
/// The pipeline's image processing is opaque to the consumer loop. It is
/// handed a freshly grabbed frame and returns zero or more candidate regions.
/// Errors are not handled by the loop; see `FailurePolicy`.
pub trait VisionPipeline: Send {
    /// Pipeline identifier for logs.
    fn name(&self) -> &'static str;

    /// Process one frame.
    ///
    /// Implementations must treat the frame as read-only and must not keep
    /// references to it past the call.
    fn process(&mut self, frame: &Frame) -> Result<DetectionResult>;
}

impl<P: VisionPipeline + ?Sized> VisionPipeline for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn process(&mut self, frame: &Frame) -> Result<DetectionResult> {
        (**self).process(frame)
    }
}
