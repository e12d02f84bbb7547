/// Gesture Tint
///
/// Classifies hand gestures from a live video source and exposes the result
/// as an observable UI state (`Neutral`, `GestureA`, `GestureB`).
pub mod config;
pub mod detection;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod scheduler;
pub mod state;
pub mod utils;
pub mod video;

pub use config::{Config, ModelConfig};
pub use detection::{
    ClassificationMapper, Detection, Detector, DetectorAdapter, DetectorLoader, LabelRule,
    ScriptedLoader,
};
pub use error::{
    AppResult, ConfigError, DetectionError, ModelLoadError, NotReadyError, SchedulerError,
    SessionError, VideoPermissionError,
};
pub use lifecycle::{FatalKind, Session, SessionStatus};
pub use scheduler::{FrameScheduler, LoopHandle, LoopStats, SchedulerConfig};
pub use state::{StateChange, StateStore, UiState};
pub use video::{Frame, ReplayVideoSource, VideoSource};
