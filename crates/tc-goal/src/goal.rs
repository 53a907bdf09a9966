// goal.rs - Goal: one "drive the temperature to a target" run.
//
// A Goal is created when a set-target request is admitted and lives until
// the step loop terminates. The state machine enforces:
//   Running → Cancelling → Cancelled
//   Running → Succeeded, Cancelling → Succeeded (last step already in flight)
//   Running → Aborted, Cancelling → Aborted

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tc_thermostat::Direction;
use uuid::Uuid;

use crate::error::GoalError;

/// The lifecycle state of a Goal.
///
/// `#[serde(tag = "state")]` serializes this as `{"state": "running"}`, with
/// the abort reason alongside when there is one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GoalState {
    /// The step loop is driving the value toward the target.
    Running,

    /// Cancellation was requested; the loop honours it at the next iteration.
    Cancelling,

    /// The value reached the target.
    Succeeded,

    /// The loop observed the cancellation request and stopped.
    Cancelled,

    /// The loop gave up (refusal cap hit, or the mutator failed).
    Aborted { reason: String },
}

impl fmt::Display for GoalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalState::Running => write!(f, "running"),
            GoalState::Cancelling => write!(f, "cancelling"),
            GoalState::Succeeded => write!(f, "succeeded"),
            GoalState::Cancelled => write!(f, "cancelled"),
            GoalState::Aborted { .. } => write!(f, "aborted"),
        }
    }
}

impl GoalState {
    /// Check whether transitioning from this state to `next` is valid.
    pub fn can_transition_to(&self, next: &GoalState) -> bool {
        matches!(
            (self, next),
            (GoalState::Running, GoalState::Cancelling)
                | (GoalState::Running, GoalState::Succeeded)
                | (GoalState::Running, GoalState::Aborted { .. })
                | (GoalState::Cancelling, GoalState::Cancelled)
                | (GoalState::Cancelling, GoalState::Succeeded)
                | (GoalState::Cancelling, GoalState::Aborted { .. })
        )
    }

    /// Succeeded, Cancelled and Aborted are final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GoalState::Succeeded | GoalState::Cancelled | GoalState::Aborted { .. }
        )
    }
}

/// A Goal: one admitted set-target request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    /// Unique identifier, handed back to the caller as the goal handle.
    pub goal_id: Uuid,

    /// Caller-supplied target. No range constraint.
    pub target_value: i16,

    /// Temperature snapshot taken at admission.
    pub initial_value: i16,

    /// Derived once at admission from initial → target.
    ///
    /// Informational only: the step loop re-derives the direction from the
    /// last observed value on every iteration, so an external overshoot is
    /// steered back. Without outside mutation the two always agree.
    pub direction: Direction,

    /// Current lifecycle state.
    pub state: GoalState,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Create a new Goal in the Running state.
    pub fn new(target_value: i16, initial_value: i16) -> Self {
        let now = Utc::now();
        Self {
            goal_id: Uuid::new_v4(),
            target_value,
            initial_value,
            direction: Direction::toward(initial_value, target_value),
            state: GoalState::Running,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new state. Returns an error if the transition is invalid.
    pub fn transition(&mut self, new_state: GoalState) -> Result<(), GoalError> {
        if !self.state.can_transition_to(&new_state) {
            return Err(GoalError::InvalidTransition {
                goal_id: self.goal_id,
                from: self.state.to_string(),
                to: new_state.to_string(),
            });
        }
        self.state = new_state;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// True when there is nothing to do: the target already equals the start.
    pub fn is_degenerate(&self) -> bool {
        self.target_value == self.initial_value
    }

    /// Percentage of the initial→target distance covered at `current`.
    ///
    /// Integer arithmetic truncating toward zero, so 20→23 reports 33, 66, 100.
    /// A degenerate goal is complete by definition and reports 100.
    pub fn progress_percent(&self, current: i16) -> i32 {
        if self.is_degenerate() {
            return 100;
        }
        let covered = i32::from(current) - i32::from(self.initial_value);
        let span = i32::from(self.target_value) - i32::from(self.initial_value);
        covered * 100 / span
    }
}
