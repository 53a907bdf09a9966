// engine.rs - The goal execution engine.
//
// Three entry points mirror the accept / cancel / execute phases of a
// goal protocol:
//
//   try_accept(target)     gate try-acquire, snapshot initial value, spawn loop
//   request_cancel(id)     mark Cancelling and trip the goal's token
//   (spawned step loop)    step until target, cancel, or abort
//
// The step loop runs on its own tokio task and holds the gate permit for
// its whole life. Admission and cancellation never wait on it, so a step
// blocked in the mutator does not delay either.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tc_thermostat::{Direction, StepMutator};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::GoalError;
use crate::events::{EventDispatcher, FeedbackSample, GoalEvent, GoalOutcome, GoalResult};
use crate::gate::{ConcurrencyGate, GatePermit};
use crate::goal::{Goal, GoalState};
use crate::snapshot::GoalSnapshot;

/// Step-loop tuning (`[goal]` in tc.toml).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Abort the goal after this many refusals in a row.
    #[serde(default = "default_max_consecutive_refusals")]
    pub max_consecutive_refusals: u32,

    /// Retry refused steps forever, ignoring `max_consecutive_refusals`.
    #[serde(default)]
    pub unbounded_refusals: bool,

    /// Pause between a refused step and the retry. 0 retries immediately.
    #[serde(default)]
    pub refusal_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_consecutive_refusals: default_max_consecutive_refusals(),
            unbounded_refusals: false,
            refusal_backoff_ms: 0,
        }
    }
}

impl EngineConfig {
    /// Effective refusal cap, `None` when unbounded. A cap of 0 behaves as 1.
    pub fn refusal_cap(&self) -> Option<u32> {
        if self.unbounded_refusals {
            None
        } else {
            Some(self.max_consecutive_refusals.max(1))
        }
    }

    pub fn refusal_backoff(&self) -> Duration {
        Duration::from_millis(self.refusal_backoff_ms)
    }
}

fn default_max_consecutive_refusals() -> u32 {
    64
}

/// Answer to a cancel request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelResponse {
    Accept,
    Reject,
}

/// Answer to a set-target request at the gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionDecision {
    Accept,
    Reject,
}

/// One message on a goal's update stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalUpdate {
    Feedback(FeedbackSample),
    Finished(GoalResult),
}

/// Caller's side of an admitted goal.
///
/// Updates arrive in step order: zero or more `Feedback`, then exactly one
/// `Finished`, after which the stream ends.
#[derive(Debug)]
pub struct GoalHandle {
    goal: Goal,
    updates: mpsc::UnboundedReceiver<GoalUpdate>,
}

impl GoalHandle {
    /// The goal as admitted (state `Running`).
    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn goal_id(&self) -> Uuid {
        self.goal.goal_id
    }

    /// Next update, or `None` once the stream has ended.
    pub async fn next_update(&mut self) -> Option<GoalUpdate> {
        self.updates.recv().await
    }

    /// Drain the stream and return the terminal result.
    ///
    /// `None` only if the step loop died without producing one.
    pub async fn into_result(mut self) -> Option<GoalResult> {
        while let Some(update) = self.updates.recv().await {
            if let GoalUpdate::Finished(result) = update {
                return Some(result);
            }
        }
        None
    }
}

struct GoalSlot {
    snapshot: GoalSnapshot,
    cancel: CancellationToken,
}

struct Shared {
    mutator: Arc<dyn StepMutator>,
    gate: ConcurrencyGate,
    config: EngineConfig,
    dispatcher: EventDispatcher,
    slot: Mutex<Option<GoalSlot>>,
}

impl Shared {
    fn lock_slot(&self) -> Result<MutexGuard<'_, Option<GoalSlot>>, GoalError> {
        self.slot.lock().map_err(|_| GoalError::StatePoisoned)
    }

    /// Status bookkeeping inside the step loop must not fail the goal, so
    /// it recovers a poisoned lock instead of erroring.
    fn with_slot_of<F>(&self, goal_id: Uuid, f: F)
    where
        F: FnOnce(&mut GoalSlot),
    {
        let mut guard = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = guard.as_mut() {
            if slot.snapshot.goal.goal_id == goal_id {
                f(slot);
            }
        }
    }

    fn record_feedback(&self, sample: &FeedbackSample) {
        self.with_slot_of(sample.goal_id, |slot| slot.snapshot.record(sample));
    }

    fn record_result(&self, result: &GoalResult) {
        let terminal = match result.outcome {
            GoalOutcome::Succeeded => GoalState::Succeeded,
            GoalOutcome::Cancelled => GoalState::Cancelled,
            GoalOutcome::Aborted => GoalState::Aborted {
                reason: result.reason.clone().unwrap_or_default(),
            },
        };
        self.with_slot_of(result.goal_id, |slot| {
            let goal = &mut slot.snapshot.goal;
            if let Err(e) = goal.transition(terminal.clone()) {
                tracing::warn!("forcing terminal state: {}", e);
                goal.state = terminal;
                goal.updated_at = Utc::now();
            }
            slot.snapshot.current_value = result.value;
            slot.snapshot.result = Some(result.clone());
        });
    }

    fn active_goal_id(&self) -> Option<Uuid> {
        let guard = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|slot| slot.snapshot.is_active())
            .map(|slot| slot.snapshot.goal.goal_id)
    }
}

/// Marks the snapshot aborted if the step loop unwinds before recording a
/// result. The gate permit is released by its own drop.
struct ExecutionGuard {
    shared: Arc<Shared>,
    goal_id: Uuid,
    armed: bool,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::error!(goal_id = %self.goal_id, "step loop ended without a result");
        let reason = "step loop terminated unexpectedly".to_string();
        self.shared.with_slot_of(self.goal_id, |slot| {
            if !slot.snapshot.goal.state.is_terminal() {
                slot.snapshot.goal.state = GoalState::Aborted { reason };
                slot.snapshot.goal.updated_at = Utc::now();
            }
        });
    }
}

/// How the step loop stopped.
struct Termination {
    outcome: GoalOutcome,
    value: i16,
    steps: u32,
    reason: Option<String>,
}

impl Termination {
    fn new(outcome: GoalOutcome, value: i16, steps: u32) -> Self {
        Self {
            outcome,
            value,
            steps,
            reason: None,
        }
    }

    fn aborted(value: i16, steps: u32, reason: String) -> Self {
        Self {
            outcome: GoalOutcome::Aborted,
            value,
            steps,
            reason: Some(reason),
        }
    }
}

/// The goal execution engine. Cheap to clone; clones share one gate.
#[derive(Clone)]
pub struct GoalEngine {
    shared: Arc<Shared>,
}

impl GoalEngine {
    pub fn new(
        mutator: Arc<dyn StepMutator>,
        config: EngineConfig,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                mutator,
                gate: ConcurrencyGate::new(),
                config,
                dispatcher,
                slot: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Whether a goal currently holds the concurrency gate.
    pub fn is_busy(&self) -> bool {
        self.shared.gate.is_busy()
    }

    /// Admit a goal for `target_value`, or reject it if one is active.
    ///
    /// On admission the initial value is read after the gate is taken and
    /// before the step loop is spawned. Must be called within a tokio runtime.
    pub async fn try_accept(&self, target_value: i16) -> Result<GoalHandle, GoalError> {
        let Some(permit) = self.shared.gate.try_acquire() else {
            let active_goal_id = self.shared.active_goal_id();
            self.shared
                .dispatcher
                .dispatch(&GoalEvent::rejected(target_value, active_goal_id));
            return Err(GoalError::Rejected {
                target_value,
                active_goal_id,
            });
        };

        // A failed read drops the permit on the way out.
        let initial_value = self.shared.mutator.current_value().await?;

        let goal = Goal::new(target_value, initial_value);
        let cancel = CancellationToken::new();
        {
            let mut slot = self.shared.lock_slot()?;
            *slot = Some(GoalSlot {
                snapshot: GoalSnapshot::new(goal.clone()),
                cancel: cancel.clone(),
            });
        }
        self.shared
            .dispatcher
            .dispatch(&GoalEvent::GoalAccepted { goal: goal.clone() });

        let (tx, updates) = mpsc::unbounded_channel();
        tokio::spawn(run_goal(
            Arc::clone(&self.shared),
            goal.clone(),
            cancel,
            permit,
            tx,
        ));

        Ok(GoalHandle { goal, updates })
    }

    /// Ask the running goal `goal_id` to stop at its next step boundary.
    ///
    /// Accepted for the active goal (repeat requests included); rejected for
    /// unknown or already finished goals. Never interrupts an in-flight step.
    pub fn request_cancel(&self, goal_id: Uuid) -> Result<CancelResponse, GoalError> {
        let mut guard = self.shared.lock_slot()?;
        let Some(slot) = guard.as_mut() else {
            return Ok(CancelResponse::Reject);
        };
        if slot.snapshot.goal.goal_id != goal_id {
            return Ok(CancelResponse::Reject);
        }

        match slot.snapshot.goal.state {
            GoalState::Running => {
                slot.snapshot.goal.transition(GoalState::Cancelling)?;
                slot.cancel.cancel();
                drop(guard);
                self.shared
                    .dispatcher
                    .dispatch(&GoalEvent::cancel_requested(goal_id));
                Ok(CancelResponse::Accept)
            }
            GoalState::Cancelling => Ok(CancelResponse::Accept),
            _ => Ok(CancelResponse::Reject),
        }
    }

    /// Status of the most recent goal, whether active or finished.
    pub fn current(&self) -> Result<Option<GoalSnapshot>, GoalError> {
        let guard = self.shared.lock_slot()?;
        Ok(guard.as_ref().map(|slot| slot.snapshot.clone()))
    }

    /// Status of `goal_id`, if it is the most recent goal.
    pub fn snapshot(&self, goal_id: Uuid) -> Result<Option<GoalSnapshot>, GoalError> {
        Ok(self
            .current()?
            .filter(|snapshot| snapshot.goal.goal_id == goal_id))
    }
}

async fn run_goal(
    shared: Arc<Shared>,
    goal: Goal,
    cancel: CancellationToken,
    permit: GatePermit,
    tx: mpsc::UnboundedSender<GoalUpdate>,
) {
    let mut guard = ExecutionGuard {
        shared: Arc::clone(&shared),
        goal_id: goal.goal_id,
        armed: true,
    };

    let termination = step_loop(&shared, &goal, &cancel, &tx).await;
    let result = GoalResult {
        goal_id: goal.goal_id,
        value: termination.value,
        outcome: termination.outcome,
        steps: termination.steps,
        reason: termination.reason,
        finished_at: Utc::now(),
    };

    // Terminal state is recorded and the gate released before anyone
    // can observe the result.
    shared.record_result(&result);
    guard.armed = false;
    drop(permit);

    let _ = tx.send(GoalUpdate::Finished(result.clone()));
    shared.dispatcher.dispatch(&GoalEvent::GoalFinished(result));
}

async fn step_loop(
    shared: &Shared,
    goal: &Goal,
    cancel: &CancellationToken,
    tx: &mpsc::UnboundedSender<GoalUpdate>,
) -> Termination {
    let refusal_cap = shared.config.refusal_cap();
    let backoff = shared.config.refusal_backoff();

    let mut current = goal.initial_value;
    let mut steps: u32 = 0;
    let mut refusals: u32 = 0;

    loop {
        if current == goal.target_value {
            return Termination::new(GoalOutcome::Succeeded, current, steps);
        }
        if cancel.is_cancelled() {
            return Termination::new(GoalOutcome::Cancelled, current, steps);
        }

        let direction = Direction::toward(current, goal.target_value);
        if direction != goal.direction {
            tracing::warn!(
                goal_id = %goal.goal_id,
                current,
                target_value = goal.target_value,
                "value moved past target outside the goal; steering back"
            );
        }

        let outcome = match shared.mutator.step(direction).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(goal_id = %goal.goal_id, "step failed: {}", e);
                return Termination::aborted(current, steps, format!("step failed: {}", e));
            }
        };

        steps = steps.saturating_add(1);
        current = outcome.value;

        let sample = FeedbackSample {
            goal_id: goal.goal_id,
            seq: steps,
            value: current,
            progress_percent: goal.progress_percent(current),
            step_accepted: outcome.accepted,
            timestamp: Utc::now(),
        };
        shared.record_feedback(&sample);
        let _ = tx.send(GoalUpdate::Feedback(sample.clone()));
        shared.dispatcher.dispatch(&GoalEvent::Feedback(sample));

        if outcome.accepted {
            refusals = 0;
            continue;
        }

        refusals = refusals.saturating_add(1);
        if current == goal.target_value {
            continue;
        }
        if let Some(cap) = refusal_cap {
            if refusals >= cap {
                return Termination::aborted(
                    current,
                    steps,
                    format!("{} consecutive step refusals", refusals),
                );
            }
        }
        // A refusal can return without suspending, so the retry always
        // gives the worker back before stepping again.
        if backoff.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::task::yield_now() => {}
            }
        } else {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
}
