/// Domain errors for the gesture loop.
///
/// Only the session-fatal kinds ([`ModelLoadError`], [`VideoPermissionError`])
/// and sequencing misuse ([`NotReadyError`]) ever reach the presentation
/// layer, wrapped in [`SessionError`]. [`DetectionError`]s are absorbed by the
/// frame scheduler one tick at a time.
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Invalid model configuration")]
    InvalidConfig(#[source] ConfigError),

    #[error("Failed to load detector '{detector}'")]
    Backend {
        detector: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to start inference worker")]
    WorkerSpawn(#[source] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Camera access was denied or no frames are available")]
pub struct VideoPermissionError;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Detector rejected the frame")]
    Rejected(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Classification timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Inference worker is not available")]
    WorkerUnavailable,

    #[error("Inference worker is still busy with an abandoned request")]
    WorkerBusy,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyError {
    #[error("Frame scheduler already started")]
    AlreadyStarted,

    #[error("Video source is not active")]
    SourceInactive,

    #[error("Cannot perform action during state transition")]
    InTransition,
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    NotReady(#[from] NotReadyError),

    #[error("Failed to start frame scheduler thread")]
    Spawn(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that cross the core boundary to the presentation layer.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    VideoPermission(#[from] VideoPermissionError),

    #[error(transparent)]
    NotReady(#[from] NotReadyError),

    #[error("Failed to start frame scheduler thread")]
    SchedulerSpawn(#[source] std::io::Error),
}

impl From<SchedulerError> for SessionError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::NotReady(err) => SessionError::NotReady(err),
            SchedulerError::Spawn(err) => SessionError::SchedulerSpawn(err),
        }
    }
}

impl SessionError {
    /// Whether the error ends the session (as opposed to a misuse of the API).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::ModelLoad(_)
                | SessionError::VideoPermission(_)
                | SessionError::SchedulerSpawn(_)
        )
    }
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;
