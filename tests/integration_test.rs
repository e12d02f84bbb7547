// Integration tests for Gesture Tint
// These drive a full session through the public API with mock detectors and video

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use gesture_tint::detection::{DetectionScript, ScriptedLoader};
use gesture_tint::{
    Config, Detection, DetectionError, Detector, FatalKind, Frame, FrameScheduler, ModelConfig,
    ModelLoadError, NotReadyError, ReplayVideoSource, SchedulerConfig, Session, SessionError,
    SessionStatus, StateChange, UiState, VideoSource,
};
use image::{Rgba, RgbaImage};

/// Camera stand-in: every call yields the next frame index
struct CountingVideo {
    grant: bool,
    active: AtomicBool,
    next_index: AtomicU64,
    starts: AtomicUsize,
    image: Arc<RgbaImage>,
}

impl CountingVideo {
    fn new(grant: bool) -> Arc<Self> {
        Arc::new(Self {
            grant,
            active: AtomicBool::new(false),
            next_index: AtomicU64::new(0),
            starts: AtomicUsize::new(0),
            image: Arc::new(RgbaImage::from_pixel(8, 8, Rgba([128, 128, 128, 255]))),
        })
    }
}

impl VideoSource for CountingVideo {
    fn start(&self) -> bool {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.active.store(self.grant, Ordering::SeqCst);
        self.grant
    }

    fn current_frame(&self) -> Option<Frame> {
        if !self.is_active() {
            return None;
        }
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        Some(Frame::from_shared(index, Arc::clone(&self.image)))
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Returns `steps[i]` for frame `i`, repeating the last step afterwards
struct SequenceDetector {
    steps: Vec<Vec<Detection>>,
    delay: Duration,
    slow_frames: Vec<u64>,
    failing_frames: Vec<u64>,
    in_flight: AtomicUsize,
    max_in_flight: Arc<AtomicUsize>,
}

impl Detector for SequenceDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.slow_frames.contains(&frame.index) {
            thread::sleep(Duration::from_millis(80));
        } else if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing_frames.contains(&frame.index) {
            return Err(DetectionError::Rejected(
                format!("no hand landmarks in frame {}", frame.index).into(),
            ));
        }
        let step = (frame.index as usize).min(self.steps.len() - 1);
        Ok(self.steps[step].clone())
    }

    fn name(&self) -> &str {
        "sequence"
    }
}

type Loader =
    Box<dyn Fn(&ModelConfig) -> Result<Box<dyn Detector>, ModelLoadError> + Send + Sync>;

fn sequence_loader(
    steps: Vec<Vec<Detection>>,
    delay: Duration,
    slow_frames: Vec<u64>,
) -> (Loader, Arc<AtomicUsize>) {
    failing_sequence_loader(steps, delay, slow_frames, vec![])
}

fn failing_sequence_loader(
    steps: Vec<Vec<Detection>>,
    delay: Duration,
    slow_frames: Vec<u64>,
    failing_frames: Vec<u64>,
) -> (Loader, Arc<AtomicUsize>) {
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&max_in_flight);
    let loader = move |_: &ModelConfig| -> Result<Box<dyn Detector>, ModelLoadError> {
        Ok(Box::new(SequenceDetector {
            steps: steps.clone(),
            delay,
            slow_frames: slow_frames.clone(),
            failing_frames: failing_frames.clone(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: Arc::clone(&observed),
        }))
    };
    (Box::new(loader), max_in_flight)
}

fn steady_loader(label: &str) -> Loader {
    sequence_loader(vec![vec![Detection::new(label, 0.9)]], Duration::ZERO, vec![]).0
}

fn fast_config() -> Config {
    Config {
        tick_interval_ms: 2,
        classify_timeout_ms: 1000,
        ..Config::default()
    }
}

fn collect_changes(rx: &Receiver<StateChange>, count: usize) -> Vec<UiState> {
    (0..count)
        .map(|_| rx.recv_timeout(Duration::from_secs(3)).unwrap().next)
        .collect()
}

#[test]
fn test_gesture_sequence_drives_ui_state() {
    let (loader, _) = sequence_loader(
        vec![
            vec![Detection::new("Open_Palm", 0.9)],
            vec![],
            vec![Detection::new("Fist", 0.9)],
        ],
        Duration::ZERO,
        vec![],
    );
    let video = CountingVideo::new(true);
    let session = Session::new(fast_config(), loader, video.clone());
    let (changes, _) = session.state_changes();
    assert_eq!(session.current_state(), UiState::Neutral);

    session.start().unwrap();
    let seen = collect_changes(&changes, 3);
    assert_eq!(seen, vec![UiState::GestureA, UiState::Neutral, UiState::GestureB]);

    // Fist repeats; no further notifications
    thread::sleep(Duration::from_millis(30));
    assert!(changes.try_recv().is_err());
    assert_eq!(session.current_state(), UiState::GestureB);

    session.shutdown();
    assert_eq!(session.status(), SessionStatus::Stopped);
    assert!(!video.is_active());
}

#[test]
fn test_state_observer_receives_previous_and_next() {
    let loader = steady_loader("closed");
    let session = Session::new(fast_config(), loader, CountingVideo::new(true));

    let (tx, rx) = crossbeam_channel::unbounded();
    session.on_state_change(move |previous, next| {
        let _ = tx.send((previous, next));
    });

    session.start().unwrap();
    let change = rx.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(change, (UiState::Neutral, UiState::GestureB));
    assert_eq!(UiState::GestureB.color_hex(), "#FF6347");
}

#[test]
fn test_model_load_failure_never_starts_loop() {
    let loader = |_: &ModelConfig| -> Result<Box<dyn Detector>, ModelLoadError> {
        Err(ModelLoadError::Backend {
            detector: "hands".to_string(),
            source: "model asset missing".into(),
        })
    };
    let video = CountingVideo::new(true);
    let session = Session::new(fast_config(), loader, video.clone());

    let err = session.start().unwrap_err();
    assert!(matches!(err, SessionError::ModelLoad(_)));
    assert!(err.is_fatal());
    assert_eq!(session.status(), SessionStatus::Failed(FatalKind::ModelLoad));
    assert_eq!(session.current_state(), UiState::Neutral);

    thread::sleep(Duration::from_millis(20));
    assert_eq!(video.starts.load(Ordering::SeqCst), 0);
    assert_eq!(session.stats().ticks, 0);
}

#[test]
fn test_video_denied_is_fatal() {
    let loader = steady_loader("open");
    let video = CountingVideo::new(false);
    let session = Session::new(fast_config(), loader, video.clone());

    let err = session.start().unwrap_err();
    assert!(matches!(err, SessionError::VideoPermission(_)));
    assert_eq!(session.status(), SessionStatus::Failed(FatalKind::VideoPermission));

    thread::sleep(Duration::from_millis(20));
    assert_eq!(session.stats().ticks, 0);
    assert_eq!(session.current_state(), UiState::Neutral);
    assert_eq!(video.starts.load(Ordering::SeqCst), 1);

    // Not retried
    assert!(matches!(
        session.start(),
        Err(SessionError::NotReady(NotReadyError::AlreadyStarted))
    ));
    assert_eq!(video.starts.load(Ordering::SeqCst), 1);
}

fn open_stall_fist() -> Vec<Vec<Detection>> {
    vec![
        vec![Detection::new("Open_Palm", 0.9)],
        vec![Detection::new("Open_Palm", 0.9)],
        vec![Detection::new("Fist", 0.9)],
    ]
}

#[test]
fn test_timeout_mid_loop_resolves_to_neutral() {
    // Frame 1 would be Open_Palm again, but stalls past the timeout
    let (loader, _) = sequence_loader(open_stall_fist(), Duration::ZERO, vec![1]);
    let config = Config {
        tick_interval_ms: 2,
        classify_timeout_ms: 10,
        ..Config::default()
    };
    let session = Session::new(config, loader, CountingVideo::new(true));
    let (changes, _) = session.state_changes();

    session.start().unwrap();
    let seen = collect_changes(&changes, 3);
    assert_eq!(seen, vec![UiState::GestureA, UiState::Neutral, UiState::GestureB]);
    assert!(session.status().is_running());

    session.shutdown();
    let stats = session.stats();
    assert_eq!(stats.timeouts, 1, "unexpected stats {:?}", stats);
}

#[test]
fn test_detector_error_mid_loop_resolves_to_neutral() {
    let (loader, _) =
        failing_sequence_loader(open_stall_fist(), Duration::ZERO, vec![], vec![1]);
    let session = Session::new(fast_config(), loader, CountingVideo::new(true));
    let (changes, _) = session.state_changes();

    session.start().unwrap();
    let seen = collect_changes(&changes, 3);
    assert_eq!(seen, vec![UiState::GestureA, UiState::Neutral, UiState::GestureB]);
    assert!(session.status().is_running());

    session.shutdown();
    let stats = session.stats();
    assert_eq!(stats.detection_errors, 1);
    assert_eq!(stats.timeouts, 0);
}

#[test]
fn test_slow_detector_never_overlaps() {
    let (loader, max_in_flight) = sequence_loader(
        vec![vec![Detection::new("open", 0.9)], vec![Detection::new("fist", 0.9)]],
        Duration::from_millis(15),
        vec![],
    );
    let config = Config {
        tick_interval_ms: 1,
        classify_timeout_ms: 1000,
        ..Config::default()
    };
    let session = Session::new(config, loader, CountingVideo::new(true));

    session.start().unwrap();
    thread::sleep(Duration::from_millis(120));
    session.shutdown();

    let stats = session.stats();
    assert_eq!(stats.peak_outstanding, 1);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    assert!(stats.skipped_busy > 0);
}

#[test]
fn test_scheduler_sequencing_misuse() {
    let scheduler = FrameScheduler::new(SchedulerConfig {
        tick_interval: Duration::from_millis(2),
        classify_timeout: Duration::from_millis(100),
    });
    // Stop before start
    scheduler.stop();
    assert!(scheduler.state().is_idle());
    assert_eq!(scheduler.stats().ticks, 0);

    let loader = steady_loader("open");
    let session = Session::new(fast_config(), loader, CountingVideo::new(true));
    session.start().unwrap();
    assert!(matches!(
        session.start(),
        Err(SessionError::NotReady(NotReadyError::AlreadyStarted))
    ));
    assert!(session.status().is_running());
}

#[test]
fn test_replay_frames_with_scripted_detector() {
    let dir = std::env::temp_dir().join(format!("gesture-tint-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    for name in ["a.png", "b.png"] {
        RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    let script = DetectionScript {
        frames: vec![vec![Detection::new("open", 0.9)], vec![Detection::new("closed", 0.9)]],
        latency_ms: 0,
    };
    let video: Arc<dyn VideoSource> = Arc::new(ReplayVideoSource::from_dir(&dir, true));
    let session = Session::new(fast_config(), ScriptedLoader::from_script(script), video);
    let (changes, _) = session.state_changes();

    session.start().unwrap();
    let seen = collect_changes(&changes, 2);
    assert!(seen.contains(&UiState::GestureA));
    assert!(seen.contains(&UiState::GestureB));
    session.shutdown();

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_config_round_trip() {
    let path = std::env::temp_dir()
        .join(format!("gesture-tint-it-config-{}", std::process::id()))
        .join("config.json");
    let config = Config {
        tick_interval_ms: 33,
        ..Config::default()
    };
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.tick_interval_ms, 33);
    assert_eq!(loaded.model, ModelConfig::default());

    let _ = std::fs::remove_file(&path);
}
