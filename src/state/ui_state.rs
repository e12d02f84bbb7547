/// Externally observable UI state
///
/// The presentation layer renders exactly one of these at any time.
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiState {
    /// No hand, or an unrecognized gesture
    #[default]
    Neutral,

    /// Open palm
    GestureA,

    /// Closed hand / fist
    GestureB,
}

impl UiState {
    /// Background color the presentation layer paints for this state
    pub fn color_hex(&self) -> &'static str {
        match self {
            UiState::Neutral => "#FFFFFF",
            UiState::GestureA => "#87CEEB",
            UiState::GestureB => "#FF6347",
        }
    }

    /// Get a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            UiState::Neutral => "Neutral (white)",
            UiState::GestureA => "Open palm (light blue)",
            UiState::GestureB => "Fist (tomato red)",
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, UiState::Neutral)
    }
}

impl std::fmt::Display for UiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}
