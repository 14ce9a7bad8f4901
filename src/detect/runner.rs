use anyhow::Result;

use crate::detect::pipeline::VisionPipeline;
use crate::detect::result::DetectionResult;
use crate::frame::{Frame, FrameSource};

/// Drives a pipeline from its own frame source.
///
/// The runner owns a dedicated frame buffer, separate from the annotator's.
/// Acquisition for detection always happens here, never in the consumer loop.
pub struct PipelineRunner<S, P> {
    source: S,
    pipeline: P,
    frame: Frame,
    frames_processed: u64,
}

impl<S: FrameSource, P: VisionPipeline> PipelineRunner<S, P> {
    pub fn new(source: S, pipeline: P) -> Self {
        Self {
            source,
            pipeline,
            frame: Frame::new(),
            frames_processed: 0,
        }
    }

    /// Grab one frame and run the pipeline on it.
    ///
    /// Returns `Ok(None)` when the source produced no frame (the pipeline is
    /// not invoked and the cycle yields nothing). Pipeline errors propagate.
    pub fn run_once(&mut self) -> Result<Option<DetectionResult>> {
        if !self.source.grab(&mut self.frame) || self.frame.is_empty() {
            log::warn!(
                "{}: pipeline frame grab failed: {}",
                self.source.name(),
                self.source.last_error()
            );
            return Ok(None);
        }
        let result = self.pipeline.process(&self.frame)?;
        self.frames_processed += 1;
        Ok(Some(result))
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn pipeline_name(&self) -> &'static str {
        self.pipeline.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use crate::geometry::Point;
    use anyhow::anyhow;

    struct FlakySource {
        calls: u32,
    }

    impl FrameSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        fn grab(&mut self, frame: &mut Frame) -> bool {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return false;
            }
            frame.resize(4, 4, PixelFormat::Gray8);
            true
        }

        fn last_error(&self) -> String {
            "timed out".to_string()
        }
    }

    struct CountingPipeline {
        calls: u32,
        fail: bool,
    }

    impl VisionPipeline for CountingPipeline {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn process(&mut self, frame: &Frame) -> Result<DetectionResult> {
            self.calls += 1;
            if self.fail {
                return Err(anyhow!("pipeline exploded"));
            }
            Ok(DetectionResult::new(vec![vec![Point::new(
                frame.width() as i32,
                0,
            )]]))
        }
    }

    #[test]
    fn failed_grab_skips_pipeline() -> Result<()> {
        let mut runner = PipelineRunner::new(
            FlakySource { calls: 0 },
            CountingPipeline {
                calls: 0,
                fail: false,
            },
        );

        let first = runner.run_once()?;
        assert_eq!(first.map(|r| r.len()), Some(1));
        assert!(runner.run_once()?.is_none());
        assert_eq!(runner.frames_processed(), 1);
        assert_eq!(runner.pipeline.calls, 1);
        Ok(())
    }

    #[test]
    fn pipeline_errors_propagate() {
        let mut runner = PipelineRunner::new(
            FlakySource { calls: 0 },
            CountingPipeline {
                calls: 0,
                fail: true,
            },
        );
        let err = runner.run_once().unwrap_err();
        assert!(err.to_string().contains("exploded"));
    }
}
