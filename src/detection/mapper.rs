/// Classification mapper
///
/// Turns the detector's output for one frame into a [`UiState`] using an
/// ordered label table.
use serde::{Deserialize, Serialize};

use super::detector::Detection;
use crate::error::DetectionError;
use crate::state::UiState;

/// Label substring → UI state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRule {
    pub pattern: String,
    pub state: UiState,
}

impl LabelRule {
    pub fn new(pattern: impl Into<String>, state: UiState) -> Self {
        Self {
            pattern: pattern.into().to_lowercase(),
            state,
        }
    }
}

/// Open palm → GestureA; closed hand or fist → GestureB
pub fn default_label_rules() -> Vec<LabelRule> {
    vec![
        LabelRule::new("open", UiState::GestureA),
        LabelRule::new("closed", UiState::GestureB),
        LabelRule::new("fist", UiState::GestureB),
    ]
}

/// Maps detections to UI states
///
/// Only the top-ranked detection is consulted. Rules are tried in order and
/// the first whose pattern occurs in the case-folded label wins; a label that
/// matches nothing maps to [`UiState::Neutral`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationMapper {
    rules: Vec<LabelRule>,
}

impl ClassificationMapper {
    pub fn new(rules: Vec<LabelRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| LabelRule::new(rule.pattern, rule.state))
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[LabelRule] {
        &self.rules
    }

    /// Map one frame's detections (descending confidence) to a UI state
    pub fn map(&self, detections: &[Detection]) -> UiState {
        let Some(top) = detections.first() else {
            return UiState::Neutral;
        };

        let label = top.label.to_lowercase();
        self.rules
            .iter()
            .find(|rule| label.contains(rule.pattern.as_str()))
            .map(|rule| rule.state)
            .unwrap_or(UiState::Neutral)
    }

    /// Map a classification outcome; a failed attempt counts as "no detection"
    pub fn map_result(&self, result: &Result<Vec<Detection>, DetectionError>) -> UiState {
        match result {
            Ok(detections) => self.map(detections),
            Err(_) => self.map(&[]),
        }
    }
}

impl Default for ClassificationMapper {
    fn default() -> Self {
        Self::new(default_label_rules())
    }
}
