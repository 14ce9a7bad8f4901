//! Detection consumer loop.
//!
//! One background thread runs cycles strictly in sequence:
//!
//! 1. The pipeline runner grabs a frame from its own source and runs detection.
//! 2. An empty result ends the cycle: no grab, no drawing, no telemetry.
//! 3. Otherwise the first candidate (pipeline order) becomes the target; its
//!    bounding box goes to the annotator, which grabs a second frame itself.
//!
//! The thread is detached: nothing joins it, and Rust does not wait for
//! spawned threads when `main` returns, so it never holds up process exit.
//! No cleanup runs when the process goes away mid-cycle.
//!
//! Pipeline errors are not handled inside a cycle. Under
//! `FailurePolicy::Terminate` the first one ends the thread; under
//! `FailurePolicy::Restart` the loop logs it, backs off and keeps going.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::annotate::{Annotation, Annotator};
use crate::detect::{PipelineRunner, VisionPipeline};
use crate::frame::FrameSource;
use crate::geometry::{bounding_rect, BoundingBox};
use crate::output::VideoSink;
use crate::telemetry::TelemetryStore;

pub const VISION_THREAD_NAME: &str = "vision";

/// What to do when the detection pipeline fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Let the vision thread end. The rest of the process keeps running.
    #[default]
    Terminate,
    /// Log the failure, wait `backoff`, then continue with the next cycle.
    Restart { backoff: Duration },
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "terminate" => Ok(FailurePolicy::Terminate),
            "restart" => Ok(FailurePolicy::Restart {
                backoff: Duration::from_secs(1),
            }),
            other => Err(anyhow!(
                "unknown pipeline failure policy '{}' (expected terminate|restart)",
                other
            )),
        }
    }
}

/// Result of a single cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The pipeline's own source produced no frame; the pipeline did not run.
    SourceUnavailable,
    /// The pipeline returned no candidates.
    NoDetection,
    /// A target was found but the annotation frame grab failed.
    FrameUnavailable(BoundingBox),
    /// A target was found, drawn, forwarded and published.
    Published(BoundingBox),
}

/// Counters shared between the vision thread and its handle.
#[derive(Debug, Default)]
pub struct VisionStats {
    cycles: AtomicU64,
    detections: AtomicU64,
    frame_misses: AtomicU64,
    pipeline_failures: AtomicU64,
}

impl VisionStats {
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn detections(&self) -> u64 {
        self.detections.load(Ordering::Relaxed)
    }

    pub fn frame_misses(&self) -> u64 {
        self.frame_misses.load(Ordering::Relaxed)
    }

    pub fn pipeline_failures(&self) -> u64 {
        self.pipeline_failures.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: &CycleOutcome) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        match outcome {
            CycleOutcome::Published(_) => {
                self.detections.fetch_add(1, Ordering::Relaxed);
            }
            CycleOutcome::FrameUnavailable(_) => {
                self.detections.fetch_add(1, Ordering::Relaxed);
                self.frame_misses.fetch_add(1, Ordering::Relaxed);
            }
            CycleOutcome::SourceUnavailable | CycleOutcome::NoDetection => {}
        }
    }
}

/// The perception-to-telemetry bridge.
pub struct VisionApplication<PS, P, AS, O, T> {
    runner: PipelineRunner<PS, P>,
    annotator: Annotator<AS, O, T>,
    failure_policy: FailurePolicy,
    cycle_interval: Duration,
    stats: Arc<VisionStats>,
}

impl<PS, P, AS, O, T> VisionApplication<PS, P, AS, O, T>
where
    PS: FrameSource + 'static,
    P: VisionPipeline + 'static,
    AS: FrameSource + 'static,
    O: VideoSink + 'static,
    T: TelemetryStore + 'static,
{
    pub fn new(runner: PipelineRunner<PS, P>, annotator: Annotator<AS, O, T>) -> Self {
        Self {
            runner,
            annotator,
            failure_policy: FailurePolicy::default(),
            cycle_interval: Duration::ZERO,
            stats: Arc::new(VisionStats::default()),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sleep between cycles. Zero (the default) runs back to back.
    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    pub fn stats(&self) -> Arc<VisionStats> {
        self.stats.clone()
    }

    /// Run one detection cycle.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let outcome = match self.runner.run_once()? {
            None => CycleOutcome::SourceUnavailable,
            Some(result) => match result.first() {
                None => CycleOutcome::NoDetection,
                Some(target) => {
                    let rect = bounding_rect(target);
                    match self.annotator.draw_rect_on_object(&rect) {
                        Annotation::Drawn => CycleOutcome::Published(rect),
                        Annotation::FrameUnavailable => CycleOutcome::FrameUnavailable(rect),
                    }
                }
            },
        };
        self.stats.record(&outcome);
        Ok(outcome)
    }

    /// Run cycles until the failure policy says stop.
    ///
    /// With `FailurePolicy::Restart` this never returns.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if let Err(err) = self.run_cycle() {
                self.stats.pipeline_failures.fetch_add(1, Ordering::Relaxed);
                match self.failure_policy {
                    FailurePolicy::Terminate => return Err(err),
                    FailurePolicy::Restart { backoff } => {
                        log::error!(
                            "pipeline {} failed: {:#}; restarting in {:?}",
                            self.runner.pipeline_name(),
                            err,
                            backoff
                        );
                        std::thread::sleep(backoff);
                        continue;
                    }
                }
            }
            if !self.cycle_interval.is_zero() {
                std::thread::sleep(self.cycle_interval);
            }
        }
    }

    /// Move the loop onto a detached background thread.
    pub fn start(mut self) -> Result<VisionHandle> {
        let stats = self.stats.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();
        let pipeline = self.runner.pipeline_name();

        let join = std::thread::Builder::new()
            .name(VISION_THREAD_NAME.to_string())
            .spawn(move || {
                let _guard = RunningGuard(running_thread);
                if let Err(err) = self.run() {
                    log::error!("vision thread stopped: pipeline {} failed: {:#}", pipeline, err);
                }
            })
            .context("spawn vision thread")?;
        log::info!("vision thread started (pipeline: {})", pipeline);

        Ok(VisionHandle {
            stats,
            running,
            _join: join,
        })
    }
}

/// Clears the running flag however the thread exits, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Observer for a started vision thread.
///
/// Dropping the handle detaches nothing further; the thread was never meant
/// to be joined.
pub struct VisionHandle {
    stats: Arc<VisionStats>,
    running: Arc<AtomicBool>,
    _join: JoinHandle<()>,
}

impl VisionHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &VisionStats {
        &self.stats
    }
}
