//! # tc-goal
//!
//! Goal lifecycle and execution for Temperature Control.
//!
//! A [`Goal`] drives the temperature to a target one unit step at a time.
//! The [`GoalEngine`] admits at most one goal at a time through a
//! [`ConcurrencyGate`], runs the step loop on its own task, streams
//! [`FeedbackSample`]s after every step, and honours cancellation at step
//! boundaries.
//!
//! ## Key components
//!
//! - [`Goal`]: the lifecycle state machine (Running → Cancelling →
//!   Succeeded / Cancelled / Aborted)
//! - [`ConcurrencyGate`]: single-slot admission, released on every exit path
//! - [`GoalEngine`]: accept / cancel / execute
//! - [`GoalEvent`]: events emitted at lifecycle points
//! - [`EventDispatcher`]: dispatches events to [`EventSink`]s (log, broadcast)

pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod goal;
pub mod snapshot;

pub use engine::{
    AdmissionDecision, CancelResponse, EngineConfig, GoalEngine, GoalHandle, GoalUpdate,
};
pub use error::GoalError;
pub use events::{
    BroadcastSink, EventDispatcher, EventSink, FeedbackSample, GoalEvent, GoalOutcome,
    GoalResult, TracingSink,
};
pub use gate::{ConcurrencyGate, GatePermit};
pub use goal::{Goal, GoalState};
pub use snapshot::{GoalSnapshot, FEEDBACK_HISTORY_LIMIT};
