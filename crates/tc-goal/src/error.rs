// error.rs - Error types for the goal lifecycle subsystem.

use tc_thermostat::ThermostatError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during goal lifecycle operations.
#[derive(Debug, Error)]
pub enum GoalError {
    /// Admission refused: another goal holds the concurrency gate.
    ///
    /// This is a decision, not a fault. Callers are expected to resubmit later.
    #[error("goal for target {target_value} rejected: goal {active_goal_id:?} is active")]
    Rejected {
        target_value: i16,
        active_goal_id: Option<Uuid>,
    },

    /// Invalid state transition.
    #[error("invalid transition from {from} to {to} for goal {goal_id}")]
    InvalidTransition {
        goal_id: Uuid,
        from: String,
        to: String,
    },

    /// The step mutator failed to read or step.
    #[error("mutator error: {0}")]
    Mutator(#[from] ThermostatError),

    /// An event sink failed to deliver (non-fatal).
    #[error("event sink error: {0}")]
    SinkError(String),

    /// The engine's status lock was poisoned by a panic.
    #[error("goal state lock poisoned")]
    StatePoisoned,
}
