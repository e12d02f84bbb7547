/// Frame scheduler state machine
///
/// Represents the lifecycle of the detection loop with clear state transitions.

use std::time::Instant;

use crate::error::NotReadyError;

/// State of the frame scheduler
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SchedulerState {
    /// Never started
    #[default]
    Idle,

    /// Loop is actively ticking
    Running { since: Instant },

    /// Stop requested, waiting for the outstanding classification to settle
    Stopping,

    /// Loop has exited
    Stopped,
}

impl SchedulerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SchedulerState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SchedulerState::Running { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, SchedulerState::Stopped)
    }

    /// Get the time since the loop started (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        match self {
            SchedulerState::Running { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    /// Get a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "Idle",
            SchedulerState::Running { .. } => "Running",
            SchedulerState::Stopping => "Stopping...",
            SchedulerState::Stopped => "Stopped",
        }
    }
}

/// State machine for scheduler transitions
///
/// A scheduler runs at most once: `Idle → Running → Stopping → Stopped`.
/// `stop` is accepted in every state and only acts on `Running`.
#[derive(Debug, Default)]
pub struct SchedulerStateMachine {
    state: SchedulerState,
}

impl SchedulerStateMachine {
    /// Create a new state machine in the Idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Transition from Idle to Running
    pub fn start(&mut self) -> Result<(), NotReadyError> {
        match self.state {
            SchedulerState::Idle => {
                self.state = SchedulerState::Running {
                    since: Instant::now(),
                };
                Ok(())
            }
            SchedulerState::Stopping => Err(NotReadyError::InTransition),
            _ => Err(NotReadyError::AlreadyStarted),
        }
    }

    /// Request a stop. Returns true if the loop was running and is now stopping.
    pub fn stop(&mut self) -> bool {
        match self.state {
            SchedulerState::Running { .. } => {
                self.state = SchedulerState::Stopping;
                true
            }
            _ => false,
        }
    }

    /// Mark the loop as exited. Valid from Running (loop exited on its own) or Stopping.
    pub fn mark_stopped(&mut self) -> Result<(), NotReadyError> {
        match self.state {
            SchedulerState::Running { .. } | SchedulerState::Stopping => {
                self.state = SchedulerState::Stopped;
                Ok(())
            }
            _ => Err(NotReadyError::InTransition),
        }
    }

    /// Force transition to Stopped (for error recovery)
    pub fn force_stop(&mut self) {
        self.state = SchedulerState::Stopped;
    }
}
