/// Session lifecycle
///
/// Sequences startup (model, then video, then scheduler), owns every
/// resource, and tears them down in reverse order on shutdown.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::detection::{ClassificationMapper, DetectorAdapter, DetectorLoader};
use crate::error::{NotReadyError, SessionError, VideoPermissionError};
use crate::scheduler::{FrameScheduler, LoopStats, SchedulerConfig};
use crate::state::{StateChange, StateStore, SubscriberId, UiState};
use crate::video::VideoSource;

/// Which fatal error ended the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    ModelLoad,
    VideoPermission,
}

/// Session status as seen by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    LoadingModel,
    AwaitingVideo,
    Running,
    Stopped,
    Failed(FatalKind),
}

impl SessionStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionStatus::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionStatus::Failed(_))
    }

    /// Get a human-readable description of the status
    pub fn description(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::LoadingModel => "Loading model...",
            SessionStatus::AwaitingVideo => "Waiting for camera...",
            SessionStatus::Running => "Running",
            SessionStatus::Stopped => "Stopped",
            SessionStatus::Failed(FatalKind::ModelLoad) => "Model failed to load",
            SessionStatus::Failed(FatalKind::VideoPermission) => "Camera unavailable",
        }
    }
}

/// Callback invoked with `(previous, next)` on every status change
pub type StatusObserver = Arc<dyn Fn(SessionStatus, SessionStatus) + Send + Sync>;

/// One run of the gesture loop
///
/// Created idle. [`Session::start`] may succeed at most once; after a fatal
/// error or [`Session::shutdown`] the session is spent.
pub struct Session {
    config: Config,
    loader: Box<dyn DetectorLoader>,
    video: Arc<dyn VideoSource>,
    store: StateStore,
    scheduler: FrameScheduler,
    adapter: Mutex<Option<Arc<DetectorAdapter>>>,
    status: RwLock<SessionStatus>,
    status_observers: RwLock<Vec<StatusObserver>>,
    // Serializes start and shutdown
    lifecycle_lock: Mutex<()>,
    video_started: AtomicBool,
}

impl Session {
    pub fn new(
        config: Config,
        loader: impl DetectorLoader + 'static,
        video: Arc<dyn VideoSource>,
    ) -> Self {
        let scheduler = FrameScheduler::new(SchedulerConfig::from(&config));
        Self {
            config,
            loader: Box::new(loader),
            video,
            store: StateStore::new(),
            scheduler,
            adapter: Mutex::new(None),
            status: RwLock::new(SessionStatus::Idle),
            status_observers: RwLock::new(Vec::new()),
            lifecycle_lock: Mutex::new(()),
            video_started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load the model, start video, then start the frame scheduler
    pub fn start(&self) -> Result<(), SessionError> {
        let _guard = self.lifecycle_lock.lock();
        if self.status() != SessionStatus::Idle {
            return Err(NotReadyError::AlreadyStarted.into());
        }

        self.set_status(SessionStatus::LoadingModel);
        let adapter = match DetectorAdapter::initialize(self.loader.as_ref(), self.config.model) {
            Ok(adapter) => Arc::new(adapter),
            Err(err) => {
                error!("Failed to load detector: {}", error_chain(&err));
                self.fail(FatalKind::ModelLoad);
                return Err(err.into());
            }
        };
        *self.adapter.lock() = Some(Arc::clone(&adapter));

        self.set_status(SessionStatus::AwaitingVideo);
        if !self.video.start() {
            error!("Video source did not start; camera access denied or no frames");
            adapter.shutdown();
            *self.adapter.lock() = None;
            self.fail(FatalKind::VideoPermission);
            return Err(VideoPermissionError.into());
        }
        self.video_started.store(true, Ordering::SeqCst);

        let mapper = ClassificationMapper::new(self.config.label_rules.clone());
        if let Err(err) = self.scheduler.start(
            Arc::clone(&adapter),
            Arc::clone(&self.video),
            mapper,
            self.store.clone(),
        ) {
            warn!("Frame scheduler did not start: {}", err);
            self.release();
            self.set_status(SessionStatus::Stopped);
            return Err(err.into());
        }

        self.set_status(SessionStatus::Running);
        info!("✓ Session running (detector '{}')", adapter.detector_name());
        Ok(())
    }

    /// Stop the scheduler and release video and detector. Safe to call more than once.
    pub fn shutdown(&self) {
        let _guard = self.lifecycle_lock.lock();
        let status = self.status();
        if matches!(status, SessionStatus::Stopped | SessionStatus::Failed(_)) {
            return;
        }

        self.scheduler.stop();
        self.scheduler.join();
        self.release();
        self.set_status(SessionStatus::Stopped);

        let stats = self.scheduler.stats();
        info!(
            "Session stopped: {} ticks, {} classified, {} errors, final state {}",
            stats.ticks,
            stats.classifications,
            stats.detection_errors,
            self.store.current()
        );
    }

    /// Current UI state
    pub fn current_state(&self) -> UiState {
        self.store.current()
    }

    /// Register a callback for UI state changes
    pub fn on_state_change<F>(&self, observer: F) -> SubscriberId
    where
        F: Fn(UiState, UiState) + Send + Sync + 'static,
    {
        self.store.subscribe(observer)
    }

    /// Receive UI state changes over a channel.
    ///
    /// Pass the id to [`Session::unsubscribe`] when done; a dropped receiver
    /// is also removed on the next state change.
    pub fn state_changes(&self) -> (Receiver<StateChange>, SubscriberId) {
        self.store.subscribe_channel()
    }

    /// Remove a state observer or channel subscription
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.store.unsubscribe(id);
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    /// Register a callback for status changes
    pub fn on_status_change<F>(&self, observer: F)
    where
        F: Fn(SessionStatus, SessionStatus) + Send + Sync + 'static,
    {
        self.status_observers.write().push(Arc::new(observer));
    }

    pub fn stats(&self) -> LoopStats {
        self.scheduler.stats()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn release(&self) {
        if self.video_started.swap(false, Ordering::SeqCst) {
            self.video.stop();
        }
        if let Some(adapter) = self.adapter.lock().take() {
            adapter.shutdown();
        }
    }

    fn fail(&self, kind: FatalKind) {
        self.store.transition(UiState::Neutral);
        self.set_status(SessionStatus::Failed(kind));
    }

    fn set_status(&self, next: SessionStatus) {
        let previous = {
            let mut status = self.status.write();
            if *status == next {
                return;
            }
            std::mem::replace(&mut *status, next)
        };
        info!("Session: {} → {}", previous.description(), next.description());

        let observers: Vec<StatusObserver> = self.status_observers.read().clone();
        for observer in observers {
            observer(previous, next);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// `outer: cause: root cause`
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
