// goal_lifecycle.rs - End-to-end behaviour of the goal execution engine.
//
// Every test drives a real GoalEngine against a scripted mutator whose
// refusals, failures and pauses are under the test's control:
//
//   - feedback values, progress and the terminal result for a clean run
//   - cancellation before the first step and between steps
//   - single-slot admission while a goal is active
//   - refusal handling (retry, cap, backoff with cancellation)
//   - gate release on every exit path, including a mutator panic

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use tc_goal::{
    CancelResponse, EngineConfig, EventDispatcher, EventSink, FeedbackSample, GoalEngine,
    GoalError, GoalEvent, GoalHandle, GoalOutcome, GoalResult, GoalState, GoalUpdate,
};
use tc_thermostat::{Direction, StepMutator, StepOutcome, Thermostat, ThermostatConfig, ThermostatError};

/// A mutator whose behaviour each test scripts up front.
#[derive(Default)]
struct ScriptedMutator {
    value: Mutex<i16>,
    /// Per-step refusal script; once exhausted every step is accepted.
    refusals: Mutex<VecDeque<bool>>,
    always_refuse: bool,
    fail_reads: bool,
    fail_at: Option<u32>,
    panic_at: Option<u32>,
    /// After applying step N, signal `paused` and wait for `resume`.
    pause_at: Option<u32>,
    steps: AtomicU32,
    paused: Notify,
    resume: Notify,
}

impl ScriptedMutator {
    fn at(value: i16) -> Self {
        Self {
            value: Mutex::new(value),
            ..Self::default()
        }
    }

    fn refusing(mut self, script: &[bool]) -> Self {
        self.refusals = Mutex::new(script.iter().copied().collect());
        self
    }

    fn always_refusing(mut self) -> Self {
        self.always_refuse = true;
        self
    }

    fn pausing_at(mut self, step: u32) -> Self {
        self.pause_at = Some(step);
        self
    }

    fn failing_at(mut self, step: u32) -> Self {
        self.fail_at = Some(step);
        self
    }

    fn panicking_at(mut self, step: u32) -> Self {
        self.panic_at = Some(step);
        self
    }

    fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Mutation from outside the goal, like a direct mutate call.
    fn set_value(&self, value: i16) {
        *self.value.lock().unwrap() = value;
    }

    fn steps_taken(&self) -> u32 {
        self.steps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepMutator for ScriptedMutator {
    async fn current_value(&self) -> Result<i16, ThermostatError> {
        if self.fail_reads {
            return Err(ThermostatError::LockPoisoned);
        }
        Ok(*self.value.lock().unwrap())
    }

    async fn step(&self, direction: Direction) -> Result<StepOutcome, ThermostatError> {
        let n = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_at == Some(n) {
            panic!("mutator fault at step {}", n);
        }
        if self.fail_at == Some(n) {
            return Err(ThermostatError::LockPoisoned);
        }

        let refuse =
            self.always_refuse || self.refusals.lock().unwrap().pop_front().unwrap_or(false);
        let outcome = {
            let mut value = self.value.lock().unwrap();
            if refuse {
                StepOutcome::refused(*value, direction)
            } else {
                *value += direction.delta();
                StepOutcome::accepted(*value, direction)
            }
        };

        if self.pause_at == Some(n) {
            self.paused.notify_one();
            self.resume.notified().await;
        }
        Ok(outcome)
    }
}

struct RecordingSink(Arc<Mutex<Vec<String>>>);

impl EventSink for RecordingSink {
    fn send(&self, event: &GoalEvent) -> Result<(), GoalError> {
        self.0.lock().unwrap().push(event.event_type().to_string());
        Ok(())
    }
}

fn engine_with(mutator: Arc<ScriptedMutator>, config: EngineConfig) -> GoalEngine {
    GoalEngine::new(mutator, config, EventDispatcher::new())
}

/// Drain a handle into (feedback, result).
async fn collect(mut handle: GoalHandle) -> (Vec<FeedbackSample>, Option<GoalResult>) {
    let mut feedback = Vec::new();
    let mut result = None;
    while let Some(update) = handle.next_update().await {
        match update {
            GoalUpdate::Feedback(sample) => {
                assert!(result.is_none(), "feedback after the result");
                feedback.push(sample);
            }
            GoalUpdate::Finished(finished) => {
                assert!(result.is_none(), "more than one result");
                result = Some(finished);
            }
        }
    }
    (feedback, result)
}

fn values(feedback: &[FeedbackSample]) -> Vec<i16> {
    feedback.iter().map(|s| s.value).collect()
}

#[tokio::test]
async fn drives_twenty_to_twenty_three() {
    let mutator = Arc::new(ScriptedMutator::at(20));
    let engine = engine_with(mutator, EngineConfig::default());

    let handle = engine.try_accept(23).await.unwrap();
    assert!(engine.is_busy());
    assert_eq!(handle.goal().initial_value, 20);
    assert_eq!(handle.goal().direction, Direction::Increment);

    let (feedback, result) = collect(handle).await;
    let result = result.unwrap();

    assert_eq!(values(&feedback), vec![21, 22, 23]);
    assert_eq!(
        feedback.iter().map(|s| s.progress_percent).collect::<Vec<_>>(),
        vec![33, 66, 100]
    );
    assert_eq!(
        feedback.iter().map(|s| s.seq).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(result.value, 23);
    assert_eq!(result.outcome, GoalOutcome::Succeeded);
    assert!(!engine.is_busy());
}

#[tokio::test]
async fn real_thermostat_reaches_target() {
    let thermostat = Arc::new(Thermostat::new(ThermostatConfig::instant(40)).unwrap());
    let engine = GoalEngine::new(thermostat.clone(), EngineConfig::default(), EventDispatcher::new());

    let result = engine.try_accept(35).await.unwrap().into_result().await.unwrap();
    assert_eq!(result.outcome, GoalOutcome::Succeeded);
    assert_eq!(result.value, 35);
    assert_eq!(thermostat.read().unwrap(), 35);
}

#[tokio::test]
async fn cancel_after_second_step() {
    let mutator = Arc::new(ScriptedMutator::at(20).pausing_at(2));
    let engine = engine_with(mutator.clone(), EngineConfig::default());

    let handle = engine.try_accept(17).await.unwrap();
    let goal_id = handle.goal_id();

    // Step 2 has applied its change but not yet returned.
    mutator.paused.notified().await;
    assert_eq!(engine.request_cancel(goal_id).unwrap(), CancelResponse::Accept);
    assert_eq!(engine.request_cancel(goal_id).unwrap(), CancelResponse::Accept);
    assert_eq!(
        engine.snapshot(goal_id).unwrap().unwrap().goal.state,
        GoalState::Cancelling
    );
    assert!(engine.is_busy());
    mutator.resume.notify_one();

    let (feedback, result) = collect(handle).await;
    let result = result.unwrap();

    assert_eq!(values(&feedback), vec![19, 18]);
    assert_eq!(result.value, 18);
    assert_eq!(result.outcome, GoalOutcome::Cancelled);
    assert_eq!(mutator.steps_taken(), 2);
    assert!(!engine.is_busy());
    assert_eq!(
        engine.snapshot(goal_id).unwrap().unwrap().goal.state,
        GoalState::Cancelled
    );
}

#[tokio::test]
async fn cancel_before_first_step_keeps_initial_value() {
    let mutator = Arc::new(ScriptedMutator::at(20));
    let engine = engine_with(mutator.clone(), EngineConfig::default());

    let handle = engine.try_accept(25).await.unwrap();
    assert_eq!(
        engine.request_cancel(handle.goal_id()).unwrap(),
        CancelResponse::Accept
    );

    let (feedback, result) = collect(handle).await;
    let result = result.unwrap();
    assert!(feedback.is_empty());
    assert_eq!(result.value, 20);
    assert_eq!(result.outcome, GoalOutcome::Cancelled);
    assert_eq!(mutator.steps_taken(), 0);
}

#[tokio::test]
async fn final_step_in_flight_wins_over_cancel() {
    let mutator = Arc::new(ScriptedMutator::at(20).pausing_at(1));
    let engine = engine_with(mutator.clone(), EngineConfig::default());

    let handle = engine.try_accept(21).await.unwrap();
    mutator.paused.notified().await;
    assert_eq!(
        engine.request_cancel(handle.goal_id()).unwrap(),
        CancelResponse::Accept
    );
    mutator.resume.notify_one();

    let (feedback, result) = collect(handle).await;
    assert_eq!(values(&feedback), vec![21]);
    assert_eq!(result.unwrap().outcome, GoalOutcome::Succeeded);
}

#[tokio::test]
async fn admission_rejected_while_goal_active() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mutator = Arc::new(ScriptedMutator::at(20).pausing_at(1));
    let engine = GoalEngine::new(
        mutator.clone(),
        EngineConfig::default(),
        EventDispatcher::new().with_sink(Box::new(RecordingSink(Arc::clone(&seen)))),
    );

    let handle = engine.try_accept(22).await.unwrap();
    let first_id = handle.goal_id();
    mutator.paused.notified().await;

    for target in [10, 30] {
        match engine.try_accept(target).await {
            Err(GoalError::Rejected {
                target_value,
                active_goal_id,
            }) => {
                assert_eq!(target_value, target);
                assert_eq!(active_goal_id, Some(first_id));
            }
            other => panic!("expected rejection, got {:?}", other.map(|h| h.goal_id())),
        }
    }

    // The active goal is untouched by the rejections.
    let snapshot = engine.current().unwrap().unwrap();
    assert_eq!(snapshot.goal.goal_id, first_id);
    assert_eq!(snapshot.goal.state, GoalState::Running);

    mutator.resume.notify_one();
    let (feedback, result) = collect(handle).await;
    assert_eq!(values(&feedback), vec![21, 22]);
    assert_eq!(result.unwrap().outcome, GoalOutcome::Succeeded);

    let events = seen.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "goal_accepted",
            "goal_rejected",
            "goal_rejected",
            "feedback",
            "feedback",
            "goal_finished",
        ]
    );

    // Free again once the first goal is done.
    assert!(engine.try_accept(20).await.is_ok());
}

#[tokio::test]
async fn refused_steps_repeat_value_and_never_regress() {
    let mutator =
        Arc::new(ScriptedMutator::at(20).refusing(&[true, false, true, true, false, false]));
    let engine = engine_with(mutator, EngineConfig::default());

    let (feedback, result) = collect(engine.try_accept(23).await.unwrap()).await;

    assert_eq!(values(&feedback), vec![20, 21, 21, 21, 22, 23]);
    assert_eq!(
        feedback.iter().map(|s| s.step_accepted).collect::<Vec<_>>(),
        vec![false, true, false, false, true, true]
    );
    for pair in feedback.windows(2) {
        assert!(pair[1].value >= pair[0].value);
    }
    let result = result.unwrap();
    assert_eq!(result.outcome, GoalOutcome::Succeeded);
    assert_eq!(result.steps, 6);
}

#[tokio::test]
async fn persistent_refusal_aborts_at_cap() {
    let mutator = Arc::new(ScriptedMutator::at(20).always_refusing());
    let config = EngineConfig {
        max_consecutive_refusals: 5,
        ..EngineConfig::default()
    };
    let engine = engine_with(mutator, config);

    let handle = engine.try_accept(10).await.unwrap();
    let goal_id = handle.goal_id();
    let (feedback, result) = collect(handle).await;
    let result = result.unwrap();

    assert_eq!(feedback.len(), 5);
    assert!(feedback.iter().all(|s| !s.step_accepted && s.value == 20));
    assert_eq!(result.outcome, GoalOutcome::Aborted);
    assert_eq!(result.value, 20);
    assert!(result.reason.unwrap().contains("5 consecutive"));
    assert!(!engine.is_busy());
    assert!(matches!(
        engine.snapshot(goal_id).unwrap().unwrap().goal.state,
        GoalState::Aborted { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn unbounded_refusals_retry_until_cancelled() {
    let mutator = Arc::new(ScriptedMutator::at(20).always_refusing());
    let config = EngineConfig {
        unbounded_refusals: true,
        refusal_backoff_ms: 50,
        ..EngineConfig::default()
    };
    let engine = engine_with(mutator.clone(), config);

    let handle = engine.try_accept(30).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(engine.is_busy());
    assert!(mutator.steps_taken() > 10);

    engine.request_cancel(handle.goal_id()).unwrap();
    let result = handle.into_result().await.unwrap();
    assert_eq!(result.outcome, GoalOutcome::Cancelled);
    assert_eq!(result.value, 20);
    assert!(!engine.is_busy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn immediate_refusal_retries_do_not_starve_the_runtime() {
    let mutator = Arc::new(ScriptedMutator::at(20).always_refusing());
    let config = EngineConfig {
        unbounded_refusals: true,
        refusal_backoff_ms: 0,
        ..EngineConfig::default()
    };
    let engine = engine_with(mutator.clone(), config);

    let handle = engine.try_accept(30).await.unwrap();

    // With one worker, another task only runs if the step loop yields.
    let other = tokio::spawn(async { 42 });
    let joined = tokio::time::timeout(Duration::from_secs(5), other).await;
    assert_eq!(joined.expect("other task starved").unwrap(), 42);
    assert!(mutator.steps_taken() > 0);

    assert_eq!(
        engine.request_cancel(handle.goal_id()).unwrap(),
        CancelResponse::Accept
    );
    let result = tokio::time::timeout(Duration::from_secs(5), handle.into_result())
        .await
        .expect("cancel not honoured")
        .unwrap();
    assert_eq!(result.outcome, GoalOutcome::Cancelled);
    assert_eq!(result.value, 20);
    assert!(!engine.is_busy());
}

#[tokio::test]
async fn mutator_error_aborts_goal() {
    let mutator = Arc::new(ScriptedMutator::at(20).failing_at(2));
    let engine = engine_with(mutator, EngineConfig::default());

    let (feedback, result) = collect(engine.try_accept(25).await.unwrap()).await;
    let result = result.unwrap();

    assert_eq!(values(&feedback), vec![21]);
    assert_eq!(result.outcome, GoalOutcome::Aborted);
    assert_eq!(result.value, 21);
    assert!(result.reason.unwrap().starts_with("step failed"));
    assert!(!engine.is_busy());
}

#[tokio::test]
async fn failed_initial_read_releases_gate() {
    let mutator = Arc::new(ScriptedMutator::at(20).failing_reads());
    let engine = engine_with(mutator, EngineConfig::default());

    let result = engine.try_accept(25).await;
    assert!(matches!(result, Err(GoalError::Mutator(_))));
    assert!(!engine.is_busy());
    assert!(engine.current().unwrap().is_none());
}

#[tokio::test]
async fn panicking_step_loop_releases_gate() {
    let mutator = Arc::new(ScriptedMutator::at(20).panicking_at(1));
    let engine = engine_with(mutator, EngineConfig::default());

    let handle = engine.try_accept(25).await.unwrap();
    let goal_id = handle.goal_id();
    assert!(handle.into_result().await.is_none());

    assert!(!engine.is_busy());
    assert!(matches!(
        engine.snapshot(goal_id).unwrap().unwrap().goal.state,
        GoalState::Aborted { .. }
    ));
}

#[tokio::test]
async fn external_overshoot_is_steered_back() {
    let mutator = Arc::new(ScriptedMutator::at(20).pausing_at(1));
    let engine = engine_with(mutator.clone(), EngineConfig::default());

    let handle = engine.try_accept(23).await.unwrap();
    mutator.paused.notified().await;
    mutator.set_value(26);
    mutator.resume.notify_one();

    let (feedback, result) = collect(handle).await;
    // Step 1 reports 21; step 2 sees the external jump and the loop
    // walks back down to the target.
    assert_eq!(values(&feedback), vec![21, 27, 26, 25, 24, 23]);
    let result = result.unwrap();
    assert_eq!(result.outcome, GoalOutcome::Succeeded);
    assert_eq!(result.value, 23);
}
