/// Detector trait and common types
///
/// Defines the interface the loop expects from the external gesture detector.
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{DetectionError, ModelLoadError};
use crate::video::Frame;

/// One labeled candidate gesture in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detector-defined category name (compared case-insensitively)
    pub label: String,
    /// Confidence level (0.0-1.0)
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Detector trait
///
/// Implement this trait to plug in a gesture model. Calls may be slow; the
/// adapter runs them off the scheduling thread.
pub trait Detector: Send + Sync {
    /// Detect hand gestures in a frame
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;

    /// Get detector name (for logging)
    fn name(&self) -> &str;
}

/// Constructs a detector from the model configuration
///
/// This is where model weights get loaded. Any closure with the right
/// signature works as a loader.
pub trait DetectorLoader: Send + Sync {
    fn load(&self, config: &ModelConfig) -> Result<Box<dyn Detector>, ModelLoadError>;
}

impl<F> DetectorLoader for F
where
    F: Fn(&ModelConfig) -> Result<Box<dyn Detector>, ModelLoadError> + Send + Sync,
{
    fn load(&self, config: &ModelConfig) -> Result<Box<dyn Detector>, ModelLoadError> {
        self(config)
    }
}
