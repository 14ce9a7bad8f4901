use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use vision_bridge::{
    bounding_rect, Annotator, BoundingBox, ColorThresholdPipeline, Contour, CycleOutcome,
    DetectionResult, FailurePolicy, Frame, FrameSource, InMemoryTelemetryStore, PipelineRunner,
    PixelFormat, Point, RectStyle, SharedSource, SyntheticConfig, SyntheticSource,
    TelemetryPublisher, VideoSink, VisionApplication, VisionPipeline,
};

const KEY: &str = "BallPosition";

/// Captures log records with the thread that emitted them.
struct CaptureLogger {
    records: Mutex<Vec<(ThreadId, log::Level, String)>>,
}

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        self.records.lock().unwrap().push((
            std::thread::current().id(),
            record.level(),
            record.args().to_string(),
        ));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: Mutex::new(Vec::new()),
};
static LOGGER_INIT: Once = Once::new();

fn capture_logs() {
    LOGGER_INIT.call_once(|| {
        log::set_logger(&LOGGER).expect("install capture logger");
        log::set_max_level(log::LevelFilter::Trace);
    });
}

/// Messages logged at `level` by the calling test's thread.
fn logged(level: log::Level) -> Vec<String> {
    let me = std::thread::current().id();
    LOGGER
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|(thread, lvl, _)| *thread == me && *lvl == level)
        .map(|(_, _, msg)| msg.clone())
        .collect()
}

/// Source that counts grabs and fails on demand.
struct CountingSource {
    grabs: Arc<AtomicU32>,
    fail: bool,
}

impl CountingSource {
    fn new(fail: bool) -> (Self, Arc<AtomicU32>) {
        let grabs = Arc::new(AtomicU32::new(0));
        (
            Self {
                grabs: grabs.clone(),
                fail,
            },
            grabs,
        )
    }
}

impl FrameSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    fn grab(&mut self, frame: &mut Frame) -> bool {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return false;
        }
        frame.resize(100, 100, PixelFormat::Bgr8);
        frame.data_mut().fill(0);
        true
    }

    fn last_error(&self) -> String {
        "camera unplugged".to_string()
    }
}

type Step = std::result::Result<Vec<Contour>, &'static str>;

/// Pipeline that replays a script, then reports nothing.
struct ScriptedPipeline {
    script: VecDeque<Step>,
}

impl ScriptedPipeline {
    fn new(script: Vec<Step>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl VisionPipeline for ScriptedPipeline {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn process(&mut self, _frame: &Frame) -> Result<DetectionResult> {
        match self.script.pop_front() {
            Some(Ok(candidates)) => Ok(DetectionResult::new(candidates)),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Ok(DetectionResult::default()),
        }
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    frames: Arc<Mutex<Vec<(u32, u32, Vec<u8>)>>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    fn pixel(&self, index: usize, x: u32, y: u32) -> Vec<u8> {
        let frames = self.frames.lock().unwrap();
        let (w, _, data) = &frames[index];
        let offset = ((y * w + x) * 3) as usize;
        data[offset..offset + 3].to_vec()
    }
}

impl VideoSink for RecordingSink {
    fn put_frame(&mut self, frame: &Frame) -> Result<()> {
        self.frames
            .lock()
            .unwrap()
            .push((frame.width(), frame.height(), frame.data().to_vec()));
        Ok(())
    }
}

struct Harness {
    app: VisionApplication<
        CountingSource,
        ScriptedPipeline,
        CountingSource,
        RecordingSink,
        InMemoryTelemetryStore,
    >,
    annotator_grabs: Arc<AtomicU32>,
    sink: RecordingSink,
    store: InMemoryTelemetryStore,
}

fn harness(script: Vec<Step>, annotator_fails: bool) -> Harness {
    let (pipeline_source, _) = CountingSource::new(false);
    let (annotator_source, annotator_grabs) = CountingSource::new(annotator_fails);
    let sink = RecordingSink::default();
    let store = InMemoryTelemetryStore::new();
    let runner = PipelineRunner::new(pipeline_source, ScriptedPipeline::new(script));
    let annotator = Annotator::new(
        annotator_source,
        sink.clone(),
        TelemetryPublisher::new(store.clone(), KEY),
        RectStyle::default(),
    );
    Harness {
        app: VisionApplication::new(runner, annotator),
        annotator_grabs,
        sink,
        store,
    }
}

/// Outline of the box with top-left (x, y) and exclusive bottom-right (x + w, y + h).
fn outline(x: i32, y: i32, w: i32, h: i32) -> Contour {
    vec![
        Point::new(x, y),
        Point::new(x + w - 1, y),
        Point::new(x + w - 1, y + h - 1),
        Point::new(x, y + h - 1),
    ]
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn empty_detection_has_no_side_effects() -> Result<()> {
    let mut h = harness(vec![Ok(vec![])], false);

    assert_eq!(h.app.run_cycle()?, CycleOutcome::NoDetection);
    assert_eq!(h.annotator_grabs.load(Ordering::SeqCst), 0);
    assert_eq!(h.sink.count(), 0);
    assert!(h.store.is_empty());
    Ok(())
}

#[test]
fn first_candidate_wins_over_larger_ones() -> Result<()> {
    let mut h = harness(
        vec![Ok(vec![outline(5, 5, 10, 10), outline(0, 0, 90, 90)])],
        false,
    );

    let outcome = h.app.run_cycle()?;
    assert_eq!(outcome, CycleOutcome::Published(BoundingBox::new(5, 5, 10, 10)));
    assert_eq!(h.store.get_string(KEY).as_deref(), Some("{5, 5, 10x10}"));
    Ok(())
}

#[test]
fn bounding_box_of_its_own_corners_is_unchanged() {
    let rect = bounding_rect(&outline(12, 7, 33, 21));
    let again = bounding_rect(&outline(rect.x, rect.y, rect.width, rect.height));
    assert_eq!(rect, again);
    assert_eq!(rect, BoundingBox::new(12, 7, 33, 21));
}

#[test]
fn failed_annotation_grab_publishes_nothing() -> Result<()> {
    capture_logs();
    let mut h = harness(vec![Ok(vec![outline(10, 20, 40, 60)])], true);

    let outcome = h.app.run_cycle()?;
    assert_eq!(
        outcome,
        CycleOutcome::FrameUnavailable(BoundingBox::new(10, 20, 40, 60))
    );
    assert_eq!(h.annotator_grabs.load(Ordering::SeqCst), 1);
    assert_eq!(h.sink.count(), 0);
    assert_eq!(h.store.write_count(), 0);
    assert_eq!(h.app.stats().frame_misses(), 1);
    assert_eq!(
        logged(log::Level::Warn),
        vec!["error grabbing frame 'camera unplugged'".to_string()]
    );
    assert!(logged(log::Level::Info)
        .iter()
        .all(|msg| !msg.starts_with("draw rect")));
    Ok(())
}

#[test]
fn detected_target_is_published_and_drawn() -> Result<()> {
    capture_logs();
    let mut h = harness(vec![Ok(vec![outline(10, 20, 40, 60)])], false);

    let outcome = h.app.run_cycle()?;
    assert_eq!(outcome, CycleOutcome::Published(BoundingBox::new(10, 20, 40, 60)));
    assert_eq!(h.store.get_string(KEY).as_deref(), Some("{10, 20, 40x60}"));
    assert_eq!(h.store.write_count(), 1);

    assert_eq!(h.sink.count(), 1);
    let magenta = vec![255u8, 0, 255];
    assert_eq!(h.sink.pixel(0, 10, 20), magenta);
    assert_eq!(h.sink.pixel(0, 50, 80), magenta);
    assert_eq!(h.sink.pixel(0, 30, 80), magenta);
    assert_eq!(h.sink.pixel(0, 30, 50), vec![0u8, 0, 0]);

    let draws: Vec<String> = logged(log::Level::Info)
        .into_iter()
        .filter(|msg| msg.starts_with("draw rect"))
        .collect();
    assert_eq!(
        draws,
        vec!["draw rect at (10, 20) with dimensions (40.000000, 60.000000)".to_string()]
    );
    Ok(())
}

#[test]
fn extreme_candidate_coordinates_do_not_stop_the_loop() -> Result<()> {
    let mut h = harness(
        vec![
            Ok(vec![vec![Point::new(-5, 0), Point::new(i32::MAX, 0)]]),
            Ok(vec![vec![Point::new(i32::MIN, i32::MIN), Point::new(i32::MAX, i32::MAX)]]),
        ],
        false,
    );

    assert_eq!(
        h.app.run_cycle()?,
        CycleOutcome::Published(BoundingBox::new(-5, 0, i32::MAX, 1))
    );
    assert_eq!(
        h.store.get_string(KEY),
        Some(format!("{{-5, 0, {}x1}}", i32::MAX))
    );
    assert!(matches!(h.app.run_cycle()?, CycleOutcome::Published(_)));
    assert_eq!(h.sink.count(), 2);
    Ok(())
}

#[test]
fn pipeline_and_annotator_share_one_camera() -> Result<()> {
    let camera = SharedSource::new(SyntheticSource::new(SyntheticConfig {
        url: "stub://shared".to_string(),
        width: 64,
        height: 48,
        target_size: 8,
        step: 0,
        ..SyntheticConfig::default()
    }));
    let annotator_camera = camera.clone();
    assert!(camera.same_source(&annotator_camera));

    let sink = RecordingSink::default();
    let store = InMemoryTelemetryStore::new();
    let mut app = VisionApplication::new(
        PipelineRunner::new(camera, ColorThresholdPipeline::default()),
        Annotator::new(
            annotator_camera,
            sink.clone(),
            TelemetryPublisher::new(store.clone(), KEY),
            RectStyle {
                color: [0, 255, 0],
                thickness: 1,
            },
        ),
    );

    assert_eq!(
        app.run_cycle()?,
        CycleOutcome::Published(BoundingBox::new(0, 20, 8, 8))
    );
    assert_eq!(store.get_string(KEY).as_deref(), Some("{0, 20, 8x8}"));
    // The outline lands on the square in the annotated frame.
    assert_eq!(sink.pixel(0, 0, 20), vec![0u8, 255, 0]);
    assert_eq!(sink.pixel(0, 4, 24), vec![255u8, 0, 255]);
    Ok(())
}

#[test]
fn missing_detection_keeps_last_value() -> Result<()> {
    let mut h = harness(vec![Ok(vec![outline(10, 20, 40, 60)]), Ok(vec![])], false);

    h.app.run_cycle()?;
    assert_eq!(h.app.run_cycle()?, CycleOutcome::NoDetection);
    assert_eq!(h.store.get_string(KEY).as_deref(), Some("{10, 20, 40x60}"));
    assert_eq!(h.store.write_count(), 1);
    assert_eq!(h.sink.count(), 1);
    Ok(())
}

#[test]
fn terminate_policy_ends_the_loop_on_pipeline_error() {
    let mut h = harness(
        vec![
            Ok(vec![outline(1, 2, 3, 4)]),
            Ok(vec![]),
            Err("model crashed"),
            Ok(vec![outline(9, 9, 9, 9)]),
        ],
        false,
    );

    let err = h.app.run().unwrap_err();
    assert!(err.to_string().contains("model crashed"));
    assert_eq!(h.store.get_string(KEY).as_deref(), Some("{1, 2, 3x4}"));
    assert_eq!(h.app.stats().cycles(), 2);
    assert_eq!(h.app.stats().pipeline_failures(), 1);
}

#[test]
fn started_thread_stops_after_pipeline_error() -> Result<()> {
    let h = harness(vec![Err("model crashed")], false);
    let handle = h.app.start()?;

    assert!(wait_until(Duration::from_secs(5), || !handle.is_running()));
    assert_eq!(handle.stats().pipeline_failures(), 1);
    assert!(h.store.is_empty());
    Ok(())
}

#[test]
fn restart_policy_keeps_publishing_after_errors() -> Result<()> {
    let h = harness(
        vec![Err("transient"), Ok(vec![outline(10, 20, 40, 60)])],
        false,
    );
    let handle = h
        .app
        .with_failure_policy(FailurePolicy::Restart {
            backoff: Duration::from_millis(1),
        })
        .with_cycle_interval(Duration::from_millis(1))
        .start()?;

    let store = h.store.clone();
    let published = wait_until(Duration::from_secs(5), || store.get_string(KEY).is_some());
    assert!(published);
    assert!(handle.is_running());
    assert_eq!(handle.stats().pipeline_failures(), 1);
    assert_eq!(store.get_string(KEY).as_deref(), Some("{10, 20, 40x60}"));
    Ok(())
}
