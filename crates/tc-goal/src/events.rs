// events.rs - Goal event model and dispatch.
//
// The engine emits an event at every lifecycle point: admission, rejection,
// cancel request, each completed step, and termination. Sinks subscribe to
// these events; the daemon's SSE streams and the structured log are both
// sinks. A failing sink never stops the others or the step loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::GoalError;
use crate::goal::Goal;

/// Progress update, one per completed step (refused steps included).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackSample {
    pub goal_id: Uuid,
    /// 1-based index of the step this sample follows.
    pub seq: u32,
    /// Temperature reported by the step.
    pub value: i16,
    pub progress_percent: i32,
    /// False when the mutator refused the step (value unchanged).
    pub step_accepted: bool,
    pub timestamp: DateTime<Utc>,
}

/// How a goal ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalOutcome {
    Succeeded,
    Cancelled,
    Aborted,
}

/// Terminal payload. Always the last message for a goal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoalResult {
    pub goal_id: Uuid,
    /// Last known temperature when the loop stopped.
    pub value: i16,
    pub outcome: GoalOutcome,
    /// Number of step calls made, refused ones included.
    pub steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Events emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GoalEvent {
    /// A set-target request was admitted.
    GoalAccepted { goal: Goal },

    /// A set-target request was turned away at the gate.
    GoalRejected {
        target_value: i16,
        active_goal_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// Cancellation was requested for a running goal.
    CancelRequested {
        goal_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A step completed.
    Feedback(FeedbackSample),

    /// The goal terminated.
    GoalFinished(GoalResult),
}

impl GoalEvent {
    /// Get the event type name as a string.
    pub fn event_type(&self) -> &str {
        match self {
            GoalEvent::GoalAccepted { .. } => "goal_accepted",
            GoalEvent::GoalRejected { .. } => "goal_rejected",
            GoalEvent::CancelRequested { .. } => "cancel_requested",
            GoalEvent::Feedback(_) => "feedback",
            GoalEvent::GoalFinished(_) => "goal_finished",
        }
    }

    /// The goal this event belongs to, if any.
    pub fn goal_id(&self) -> Option<Uuid> {
        match self {
            GoalEvent::GoalAccepted { goal } => Some(goal.goal_id),
            GoalEvent::GoalRejected { .. } => None,
            GoalEvent::CancelRequested { goal_id, .. } => Some(*goal_id),
            GoalEvent::Feedback(sample) => Some(sample.goal_id),
            GoalEvent::GoalFinished(result) => Some(result.goal_id),
        }
    }

    pub fn rejected(target_value: i16, active_goal_id: Option<Uuid>) -> Self {
        GoalEvent::GoalRejected {
            target_value,
            active_goal_id,
            timestamp: Utc::now(),
        }
    }

    pub fn cancel_requested(goal_id: Uuid) -> Self {
        GoalEvent::CancelRequested {
            goal_id,
            timestamp: Utc::now(),
        }
    }
}

/// Trait for receiving goal events.
pub trait EventSink: Send + Sync {
    /// Handle an event. Errors are logged but don't stop the system.
    fn send(&self, event: &GoalEvent) -> Result<(), GoalError>;
}

/// Writes every event to the structured log.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn send(&self, event: &GoalEvent) -> Result<(), GoalError> {
        match event {
            GoalEvent::GoalAccepted { goal } => tracing::info!(
                goal_id = %goal.goal_id,
                initial = goal.initial_value,
                target_value = goal.target_value,
                direction = %goal.direction,
                "goal accepted"
            ),
            GoalEvent::GoalRejected {
                target_value,
                active_goal_id,
                ..
            } => tracing::info!(
                target_value,
                active = ?active_goal_id,
                "goal rejected: another goal is active"
            ),
            GoalEvent::CancelRequested { goal_id, .. } => {
                tracing::info!(goal_id = %goal_id, "cancel requested")
            }
            GoalEvent::Feedback(sample) => tracing::debug!(
                goal_id = %sample.goal_id,
                seq = sample.seq,
                value = sample.value,
                progress = sample.progress_percent,
                accepted = sample.step_accepted,
                "feedback"
            ),
            GoalEvent::GoalFinished(result) => tracing::info!(
                goal_id = %result.goal_id,
                value = result.value,
                outcome = ?result.outcome,
                steps = result.steps,
                "goal finished"
            ),
        }
        Ok(())
    }
}

/// Fans events out on a tokio broadcast channel (used by SSE streams).
///
/// Sending with no live receivers is not an error: nobody is listening.
pub struct BroadcastSink {
    tx: broadcast::Sender<GoalEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<GoalEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastSink {
    fn send(&self, event: &GoalEvent) -> Result<(), GoalError> {
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// Dispatches events to multiple sinks.
///
/// Errors from individual sinks are logged (via tracing) but don't
/// prevent other sinks from receiving the event.
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    /// Create a new dispatcher with no sinks.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add an event sink.
    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Builder form of [`add_sink`](Self::add_sink).
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.add_sink(sink);
        self
    }

    /// Dispatch an event to all sinks.
    pub fn dispatch(&self, event: &GoalEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!("event sink error: {}", e);
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    impl EventSink for RecordingSink {
        fn send(&self, event: &GoalEvent) -> Result<(), GoalError> {
            self.0.lock().unwrap().push(event.event_type().to_string());
            Ok(())
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn send(&self, _event: &GoalEvent) -> Result<(), GoalError> {
            Err(GoalError::SinkError("down".to_string()))
        }
    }

    #[test]
    fn event_serialization_is_tagged() {
        let event = GoalEvent::rejected(23, Some(Uuid::new_v4()));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"goal_rejected\""));

        let restored: GoalEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.event_type(), "goal_rejected");
    }

    #[test]
    fn feedback_event_flattens_sample_fields() {
        let sample = FeedbackSample {
            goal_id: Uuid::new_v4(),
            seq: 1,
            value: 21,
            progress_percent: 33,
            step_accepted: true,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(GoalEvent::Feedback(sample.clone())).unwrap();
        assert_eq!(json["event_type"], "feedback");
        assert_eq!(json["value"], 21);
        assert_eq!(json["progress_percent"], 33);
        assert_eq!(
            GoalEvent::Feedback(sample.clone()).goal_id(),
            Some(sample.goal_id)
        );
    }

    #[test]
    fn dispatcher_continues_past_failing_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = EventDispatcher::new()
            .with_sink(Box::new(FailingSink))
            .with_sink(Box::new(RecordingSink(Arc::clone(&seen))));

        dispatcher.dispatch(&GoalEvent::cancel_requested(Uuid::new_v4()));

        assert_eq!(*seen.lock().unwrap(), vec!["cancel_requested".to_string()]);
    }

    #[test]
    fn broadcast_sink_tolerates_no_receivers() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let sink = BroadcastSink::new(tx);
        assert!(sink.send(&GoalEvent::rejected(1, None)).is_ok());
    }

    #[tokio::test]
    async fn broadcast_sink_delivers_to_subscribers() {
        let (tx, mut rx) = broadcast::channel(4);
        let sink = BroadcastSink::new(tx);
        let goal_id = Uuid::new_v4();
        sink.send(&GoalEvent::cancel_requested(goal_id)).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.goal_id(), Some(goal_id));
    }
}
