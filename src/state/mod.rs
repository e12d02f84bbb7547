/// State management module
///
/// Owned UI state, its observers, and the frame scheduler's lifecycle states.

pub mod scheduler_state;
pub mod store;
pub mod ui_state;

// Re-export commonly used types
pub use scheduler_state::{SchedulerState, SchedulerStateMachine};
pub use store::{StateChange, StateObserver, StateStore, SubscriberId};
pub use ui_state::UiState;
