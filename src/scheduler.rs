/// Frame scheduler
///
/// Drives the classification loop: one attempt per tick, never more than one
/// outstanding, cancellable at any time.
///
/// ```text
///  tick ──► frame? ──► submit ──► select! { reply | timeout | tick (no-op) | stop }
///                                     │
///                          map ──► StateStore::transition
/// ```
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, never, select, tick, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::detection::{
    ClassificationMapper, ClassifyOutcome, DetectorAdapter, PendingClassification,
};
use crate::error::{DetectionError, NotReadyError, SchedulerError};
use crate::state::{SchedulerState, SchedulerStateMachine, StateStore};
use crate::utils::LatencyStats;
use crate::video::VideoSource;

const STATS_LOG_EVERY: u64 = 100;
const THREAD_NAME: &str = "gesture-scheduler";

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Pacing and timeout for the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub classify_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            classify_timeout: config.classify_timeout(),
        }
    }
}

/// Registration token for an active loop
///
/// Cancelling it turns every later tick of that loop into a no-op.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl LoopHandle {
    fn new() -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Snapshot of loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    /// Classifications that returned detections (possibly empty)
    pub classifications: u64,
    /// Failed attempts, timeouts included
    pub detection_errors: u64,
    pub timeouts: u64,
    /// Ticks that fired while a classification was outstanding or the
    /// detector was still busy with an abandoned one
    pub skipped_busy: u64,
    /// Ticks with no frame available
    pub skipped_no_frame: u64,
    /// Results dropped because a stop arrived while they were pending
    pub discarded: u64,
    /// Highest number of simultaneously outstanding classifications
    pub peak_outstanding: u64,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    classifications: AtomicU64,
    detection_errors: AtomicU64,
    timeouts: AtomicU64,
    skipped_busy: AtomicU64,
    skipped_no_frame: AtomicU64,
    discarded: AtomicU64,
    outstanding: AtomicU64,
    peak_outstanding: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LoopStats {
        LoopStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            classifications: self.classifications.load(Ordering::Relaxed),
            detection_errors: self.detection_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            skipped_busy: self.skipped_busy.load(Ordering::Relaxed),
            skipped_no_frame: self.skipped_no_frame.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            peak_outstanding: self.peak_outstanding.load(Ordering::Relaxed),
        }
    }

    fn begin_outstanding(&self) {
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_outstanding.fetch_max(now, Ordering::SeqCst);
    }

    fn end_outstanding(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

struct SchedulerShared {
    machine: Mutex<SchedulerStateMachine>,
    stopped: Condvar,
    counters: Counters,
}

impl SchedulerShared {
    fn mark_stopped(&self) {
        let mut machine = self.machine.lock();
        if machine.mark_stopped().is_err() {
            machine.force_stop();
        }
        self.stopped.notify_all();
    }
}

/// Runs classification attempts against a video source, one per tick
pub struct FrameScheduler {
    config: SchedulerConfig,
    shared: Arc<SchedulerShared>,
    handle: Mutex<Option<LoopHandle>>,
    stop_tx: Mutex<Option<Sender<()>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl FrameScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(SchedulerShared {
                machine: Mutex::new(SchedulerStateMachine::new()),
                stopped: Condvar::new(),
                counters: Counters::default(),
            }),
            handle: Mutex::new(None),
            stop_tx: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.machine.lock().state()
    }

    pub fn stats(&self) -> LoopStats {
        self.shared.counters.snapshot()
    }

    /// Handle of the active (or last) loop
    pub fn handle(&self) -> Option<LoopHandle> {
        self.handle.lock().clone()
    }

    /// Start the loop thread.
    ///
    /// Only valid once, from Idle, with an active video source. A start
    /// refused with `NotReady` leaves the scheduler untouched; a failed
    /// thread spawn leaves it Stopped.
    pub fn start(
        &self,
        adapter: Arc<DetectorAdapter>,
        source: Arc<dyn VideoSource>,
        mapper: ClassificationMapper,
        store: StateStore,
    ) -> Result<LoopHandle, SchedulerError> {
        let mut machine = self.shared.machine.lock();
        if machine.state().is_idle() && !source.is_active() {
            return Err(NotReadyError::SourceInactive.into());
        }
        machine.start()?;

        let handle = LoopHandle::new();
        let (stop_tx, stop_rx) = bounded(1);
        let ctx = LoopContext {
            config: self.config,
            handle: handle.clone(),
            stop_rx,
            adapter,
            source,
            mapper,
            store,
            shared: Arc::clone(&self.shared),
        };

        let join = match thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || ctx.run())
        {
            Ok(join) => join,
            Err(err) => {
                error!("Failed to spawn frame scheduler thread: {}", err);
                machine.force_stop();
                self.shared.stopped.notify_all();
                return Err(SchedulerError::Spawn(err));
            }
        };

        *self.handle.lock() = Some(handle.clone());
        *self.stop_tx.lock() = Some(stop_tx);
        *self.thread.lock() = Some(join);

        info!(
            "Frame scheduler started (loop #{}, tick {:?}, timeout {:?})",
            handle.id(),
            self.config.tick_interval,
            self.config.classify_timeout
        );
        Ok(handle)
    }

    /// Request the loop to stop. No-op unless running.
    ///
    /// An outstanding classification may still settle, but its result is dropped.
    pub fn stop(&self) {
        let stopping = self.shared.machine.lock().stop();
        if !stopping {
            debug!("stop() ignored in state {}", self.state().description());
            return;
        }

        if let Some(handle) = self.handle.lock().as_ref() {
            handle.cancel();
        }
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(());
        }
        info!("Frame scheduler stopping");
    }

    /// Wait for the loop thread to exit
    pub fn join(&self) {
        let Some(join) = self.thread.lock().take() else {
            return;
        };
        if join.join().is_err() {
            error!("Frame scheduler thread panicked");
            self.shared.mark_stopped();
        }
    }

    /// Wait until the loop reports Stopped. Returns false on timeout.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let mut machine = self.shared.machine.lock();
        if machine.state().is_stopped() {
            return true;
        }
        let _ = self.shared.stopped.wait_for(&mut machine, timeout);
        machine.state().is_stopped()
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

struct LoopContext {
    config: SchedulerConfig,
    handle: LoopHandle,
    stop_rx: Receiver<()>,
    adapter: Arc<DetectorAdapter>,
    source: Arc<dyn VideoSource>,
    mapper: ClassificationMapper,
    store: StateStore,
    shared: Arc<SchedulerShared>,
}

/// How an outstanding classification ended
struct Settled {
    outcome: ClassifyOutcome,
    stop_requested: bool,
}

impl LoopContext {
    fn run(self) {
        let ticker = tick(self.config.tick_interval);
        let mut latency = LatencyStats::with_capacity(1024);

        loop {
            select! {
                recv(self.stop_rx) -> _ => break,
                recv(ticker) -> _ => {}
            }
            if self.handle.is_cancelled() {
                break;
            }

            let counters = &self.shared.counters;
            let tick_no = counters.ticks.fetch_add(1, Ordering::Relaxed) + 1;
            if tick_no % STATS_LOG_EVERY == 0 {
                self.log_progress(tick_no);
            }

            let Some(frame) = self.source.current_frame() else {
                counters.skipped_no_frame.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let frame_index = frame.index;
            let pending = match self.adapter.submit(frame) {
                Ok(pending) => pending,
                Err(DetectionError::WorkerBusy) => {
                    // Detector still stuck on a timed-out frame
                    counters.skipped_busy.fetch_add(1, Ordering::Relaxed);
                    trace!("Detector busy; skipping frame {}", frame_index);
                    continue;
                }
                Err(err) => {
                    self.apply(frame_index, Err(err));
                    continue;
                }
            };

            counters.begin_outstanding();
            let settled = self.await_outcome(&pending, &ticker);
            counters.end_outstanding();
            if settled.outcome.is_ok() {
                latency.record(pending.elapsed());
            }

            if settled.stop_requested || self.handle.is_cancelled() {
                counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!("Discarding result for frame {} after stop", frame_index);
                break;
            }

            self.apply(frame_index, settled.outcome);
        }

        let stats = self.shared.counters.snapshot();
        info!(
            "Frame scheduler stopped (loop #{}): {} ticks, {} classified, {} errors",
            self.handle.id(),
            stats.ticks,
            stats.classifications,
            stats.detection_errors
        );
        latency.log_report("Classify latency");
        self.shared.mark_stopped();
    }

    fn log_progress(&self, tick_no: u64) {
        let stats = self.shared.counters.snapshot();
        debug!(
            "Tick {}: {} classified | {} errors ({} timeouts) | {} busy | {} no frame | state {}",
            tick_no,
            stats.classifications,
            stats.detection_errors,
            stats.timeouts,
            stats.skipped_busy,
            stats.skipped_no_frame,
            self.store.current()
        );
    }

    /// Wait for the pending classification while absorbing ticks.
    ///
    /// A stop request does not abandon the wait; the request still settles
    /// (or times out) before the loop exits.
    fn await_outcome(
        &self,
        pending: &PendingClassification,
        ticker: &Receiver<Instant>,
    ) -> Settled {
        let deadline = after(self.config.classify_timeout);
        let mut stop_requested = false;

        loop {
            // The stop sender is dropped once it fires; stop listening after that.
            let stop_rx = if stop_requested {
                never()
            } else {
                self.stop_rx.clone()
            };
            select! {
                recv(pending.receiver()) -> msg => {
                    let outcome = msg.unwrap_or(Err(DetectionError::WorkerUnavailable));
                    return Settled { outcome, stop_requested };
                }
                recv(deadline) -> _ => {
                    pending.cancel();
                    return Settled {
                        outcome: Err(DetectionError::TimedOut(self.config.classify_timeout)),
                        stop_requested,
                    };
                }
                recv(ticker) -> _ => {
                    self.shared.counters.skipped_busy.fetch_add(1, Ordering::Relaxed);
                }
                recv(stop_rx) -> _ => {
                    stop_requested = true;
                }
            }
        }
    }

    fn apply(&self, frame_index: u64, outcome: ClassifyOutcome) {
        let counters = &self.shared.counters;
        match &outcome {
            Ok(_) => {
                counters.classifications.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                counters.detection_errors.fetch_add(1, Ordering::Relaxed);
                if matches!(err, DetectionError::TimedOut(_)) {
                    counters.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                warn!("Classification failed on frame {}: {}", frame_index, err);
            }
        }

        let next = self.mapper.map_result(&outcome);
        self.store.transition(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::detection::{Detection, Detector};
    use crate::error::ModelLoadError;
    use crate::state::UiState;
    use crate::video::{Frame, ReplayVideoSource};
    use image::RgbaImage;

    struct Slow {
        delay: Duration,
        label: &'static str,
    }

    impl Detector for Slow {
        fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
            thread::sleep(self.delay);
            Ok(vec![Detection::new(self.label, 0.9)])
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    /// Always-on source that remembers which thread asked for frames
    struct ThreadTracking {
        image: Arc<RgbaImage>,
        seen_on: Mutex<Option<String>>,
    }

    impl VideoSource for ThreadTracking {
        fn start(&self) -> bool {
            true
        }

        fn current_frame(&self) -> Option<Frame> {
            *self.seen_on.lock() = thread::current().name().map(str::to_owned);
            Some(Frame::from_shared(0, Arc::clone(&self.image)))
        }

        fn is_active(&self) -> bool {
            true
        }

        fn stop(&self) {}
    }

    fn adapter(delay: Duration, label: &'static str) -> Arc<DetectorAdapter> {
        let loader = move |_: &ModelConfig| -> Result<Box<dyn Detector>, ModelLoadError> {
            Ok(Box::new(Slow { delay, label }))
        };
        Arc::new(DetectorAdapter::initialize(&loader, ModelConfig::default()).unwrap())
    }

    fn started_source() -> Arc<dyn VideoSource> {
        let source = ReplayVideoSource::from_images(vec![RgbaImage::new(2, 2)]);
        assert!(source.start());
        Arc::new(source)
    }

    fn config(tick_ms: u64, timeout_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_millis(tick_ms),
            classify_timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn start(
        scheduler: &FrameScheduler,
        adapter: Arc<DetectorAdapter>,
        store: &StateStore,
    ) -> Result<LoopHandle, SchedulerError> {
        scheduler.start(
            adapter,
            started_source(),
            ClassificationMapper::default(),
            store.clone(),
        )
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let scheduler = FrameScheduler::new(config(2, 500));
        scheduler.stop();
        scheduler.join();
        assert!(scheduler.state().is_idle());
        assert!(scheduler.handle().is_none());
    }

    #[test]
    fn test_start_requires_active_source() {
        let scheduler = FrameScheduler::new(config(2, 500));
        let inactive: Arc<dyn VideoSource> =
            Arc::new(ReplayVideoSource::from_images(vec![RgbaImage::new(2, 2)]));

        let err = scheduler
            .start(
                adapter(Duration::ZERO, "open"),
                inactive,
                ClassificationMapper::default(),
                StateStore::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::NotReady(NotReadyError::SourceInactive)
        ));
        assert!(scheduler.state().is_idle());
    }

    #[test]
    fn test_double_start_fails_without_reset() {
        let scheduler = FrameScheduler::new(config(2, 500));
        let store = StateStore::new();
        let first = start(&scheduler, adapter(Duration::ZERO, "open"), &store).unwrap();

        let err = start(&scheduler, adapter(Duration::ZERO, "fist"), &store).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::NotReady(NotReadyError::AlreadyStarted)
        ));
        assert!(scheduler.state().is_running());
        assert_eq!(scheduler.handle().unwrap().id(), first.id());

        scheduler.stop();
        scheduler.join();
        assert!(scheduler.state().is_stopped());
    }

    #[test]
    fn test_loop_drives_store() {
        let scheduler = FrameScheduler::new(config(2, 500));
        let store = StateStore::new();
        let (rx, _id) = store.subscribe_channel();

        start(&scheduler, adapter(Duration::ZERO, "Open_Palm"), &store).unwrap();

        let change = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(change.next, UiState::GestureA);

        scheduler.stop();
        assert!(scheduler.wait_stopped(Duration::from_secs(2)));
        scheduler.join();
        assert!(scheduler.stats().classifications >= 1);
    }

    #[test]
    fn test_loop_runs_on_named_thread() {
        let scheduler = FrameScheduler::new(config(2, 500));
        let source = Arc::new(ThreadTracking {
            image: Arc::new(RgbaImage::new(2, 2)),
            seen_on: Mutex::new(None),
        });

        scheduler
            .start(
                adapter(Duration::ZERO, "open"),
                source.clone(),
                ClassificationMapper::default(),
                StateStore::new(),
            )
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        scheduler.stop();
        scheduler.join();

        assert_eq!(source.seen_on.lock().as_deref(), Some("gesture-scheduler"));
    }

    #[test]
    fn test_slow_detector_never_overlaps() {
        let scheduler = FrameScheduler::new(config(1, 2000));
        start(&scheduler, adapter(Duration::from_millis(20), "fist"), &StateStore::new()).unwrap();
        thread::sleep(Duration::from_millis(150));
        scheduler.stop();
        scheduler.join();

        let stats = scheduler.stats();
        assert_eq!(stats.peak_outstanding, 1);
        assert!(stats.skipped_busy > 0);
    }

    #[test]
    fn test_timeout_keeps_loop_alive() {
        let scheduler = FrameScheduler::new(config(1, 5));
        start(&scheduler, adapter(Duration::from_millis(40), "open"), &StateStore::new()).unwrap();
        thread::sleep(Duration::from_millis(200));
        scheduler.stop();
        scheduler.join();

        let stats = scheduler.stats();
        assert!(stats.timeouts >= 2, "expected repeated timeouts, got {:?}", stats);
        assert_eq!(stats.classifications, 0);
        assert_eq!(stats.detection_errors, stats.timeouts);
    }

    #[test]
    fn test_hung_detector_does_not_queue_frames() {
        let scheduler = FrameScheduler::new(config(1, 5));
        let hung = adapter(Duration::from_millis(400), "open");
        start(&scheduler, Arc::clone(&hung), &StateStore::new()).unwrap();

        for _ in 0..20 {
            thread::sleep(Duration::from_millis(5));
            assert!(hung.pending_requests() <= 1);
        }
        scheduler.stop();
        scheduler.join();

        let stats = scheduler.stats();
        assert_eq!(stats.timeouts, 1, "only the stuck frame times out: {:?}", stats);
        assert!(stats.skipped_busy > 0);
        assert_eq!(hung.pending_requests(), 0);
    }

    #[test]
    fn test_stop_discards_outstanding_result() {
        let scheduler = FrameScheduler::new(config(1, 2000));
        let store = StateStore::new();

        start(&scheduler, adapter(Duration::from_millis(100), "open"), &store).unwrap();
        // Stop while the first classification is in flight
        thread::sleep(Duration::from_millis(30));
        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopping);

        scheduler.join();
        assert!(scheduler.state().is_stopped());
        assert_eq!(store.current(), UiState::Neutral);
        assert_eq!(scheduler.stats().discarded, 1);
        assert!(scheduler.handle().unwrap().is_cancelled());
    }
}
