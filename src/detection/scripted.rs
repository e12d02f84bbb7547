/// Scripted detector implementation
///
/// Replays a fixed sequence of per-frame detections. Stands in for a real
/// hand-tracking model when running without one.
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::detector::{Detection, Detector, DetectorLoader};
use crate::config::ModelConfig;
use crate::error::{DetectionError, ModelLoadError};
use crate::video::Frame;

const DETECTOR_NAME: &str = "scripted";

/// JSON script: `{ "frames": [[{"label": "Open_Palm", "confidence": 0.9}], []], "latency_ms": 5 }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionScript {
    /// Detections for frame `i` (wrapping around)
    pub frames: Vec<Vec<Detection>>,

    /// Simulated inference latency per call
    #[serde(default)]
    pub latency_ms: u64,
}

/// Detector that looks up `frame.index` in a script
pub struct ScriptedDetector {
    frames: Vec<Vec<Detection>>,
    latency: Duration,
    confidence_threshold: f32,
}

impl ScriptedDetector {
    pub fn new(script: DetectionScript, config: &ModelConfig) -> Result<Self, ModelLoadError> {
        if script.frames.is_empty() {
            return Err(ModelLoadError::Backend {
                detector: DETECTOR_NAME.to_string(),
                source: "detection script has no frames".into(),
            });
        }

        Ok(Self {
            frames: script.frames,
            latency: Duration::from_millis(script.latency_ms),
            confidence_threshold: config.confidence_threshold,
        })
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let step = &self.frames[(frame.index % self.frames.len() as u64) as usize];
        let detections = step
            .iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .cloned()
            .collect();
        Ok(detections)
    }

    fn name(&self) -> &str {
        DETECTOR_NAME
    }
}

enum ScriptSource {
    File(PathBuf),
    Inline(DetectionScript),
}

/// Loads a [`ScriptedDetector`] from a JSON file or an in-memory script
pub struct ScriptedLoader {
    source: ScriptSource,
}

impl ScriptedLoader {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: ScriptSource::File(path.into()),
        }
    }

    pub fn from_script(script: DetectionScript) -> Self {
        Self {
            source: ScriptSource::Inline(script),
        }
    }

    fn read_script(&self) -> Result<DetectionScript, ModelLoadError> {
        let backend = |source: Box<dyn std::error::Error + Send + Sync>| ModelLoadError::Backend {
            detector: DETECTOR_NAME.to_string(),
            source,
        };

        match &self.source {
            ScriptSource::Inline(script) => Ok(script.clone()),
            ScriptSource::File(path) => {
                let content = fs::read_to_string(path).map_err(|e| backend(Box::new(e)))?;
                let script = serde_json::from_str(&content).map_err(|e| backend(Box::new(e)))?;
                tracing::debug!("Read detection script from {}", path.display());
                Ok(script)
            }
        }
    }
}

impl DetectorLoader for ScriptedLoader {
    fn load(&self, config: &ModelConfig) -> Result<Box<dyn Detector>, ModelLoadError> {
        let script = self.read_script()?;
        let detector = ScriptedDetector::new(script, config)?;
        Ok(Box::new(detector))
    }
}
