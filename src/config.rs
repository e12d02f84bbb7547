use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detection::mapper::{default_label_rules, LabelRule};
use crate::error::ConfigError;

/// Detector tuning knobs, forwarded verbatim to the detector at load time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Flip frames horizontally (webcam preview is mirrored)
    pub mirror_input: bool,

    /// Maximum detections returned per frame
    pub max_detections: usize,

    /// IoU-style overlap threshold for suppressing duplicate boxes (0.0-1.0)
    pub overlap_threshold: f32,

    /// Minimum confidence for a detection to be reported (0.0-1.0)
    pub confidence_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            mirror_input: true,
            max_detections: 1, // Only one hand
            overlap_threshold: 0.5,
            confidence_threshold: 0.6,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_detections == 0 {
            return Err(ConfigError::Invalid(
                "max_detections must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.overlap_threshold) {
            return Err(ConfigError::Invalid(format!(
                "overlap_threshold {} is outside 0.0-1.0",
                self.overlap_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold {} is outside 0.0-1.0",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

fn default_tick_interval_ms() -> u64 {
    16
}

fn default_classify_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Detector configuration, passed once at initialization
    #[serde(default)]
    pub model: ModelConfig,

    /// Scheduling tick in milliseconds (~60 FPS by default)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// A classification still pending after this long counts as failed
    #[serde(default = "default_classify_timeout_ms")]
    pub classify_timeout_ms: u64,

    /// Ordered label rules; first match wins
    #[serde(default = "default_label_rules")]
    pub label_rules: Vec<LabelRule>,

    /// Directory of still frames replayed as the video stream
    #[serde(default)]
    pub frames_dir: Option<PathBuf>,

    /// JSON detection script for the scripted detector
    #[serde(default)]
    pub script_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            tick_interval_ms: default_tick_interval_ms(),
            classify_timeout_ms: default_classify_timeout_ms(),
            label_rules: default_label_rules(),
            frames_dir: None,
            script_path: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`.
    /// Creates a default config file if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.display().to_string(),
                    source: Box::new(e),
                })?;
            config.validate()?;

            tracing::info!("✓ Loaded config from: {}", path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!("✓ Created default config at: {}", path.display());
            Ok(config)
        }
    }

    /// Save configuration to disk
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        fs::write(path, json).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    /// Platform config location: `<config_dir>/GestureTint/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("GestureTint").join("config.json"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;

        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.classify_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "classify_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.label_rules.is_empty() {
            return Err(ConfigError::Invalid(
                "label_rules must contain at least one rule".to_string(),
            ));
        }
        if let Some(rule) = self.label_rules.iter().find(|r| r.pattern.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "label rule for {:?} has an empty pattern",
                rule.state
            )));
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms.max(1))
    }
}
