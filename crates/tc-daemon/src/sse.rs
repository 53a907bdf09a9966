//! Server-Sent Event streams: periodic temperature and per-goal progress.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Serialize;
use tc_goal::{FeedbackSample, GoalEvent, GoalResult, GoalSnapshot};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping")
}

fn json_event(name: &str, payload: &impl Serialize) -> Option<Event> {
    match serde_json::to_string(payload) {
        Ok(json) => Some(Event::default().event(name).data(json)),
        Err(e) => {
            warn!(event = name, "dropping unserializable SSE payload: {}", e);
            None
        }
    }
}

fn feedback_event(sample: &FeedbackSample) -> Option<Event> {
    json_event("feedback", sample)
}

fn result_event(result: &GoalResult) -> Option<Event> {
    json_event("result", result)
}

/// GET /api/temperature/stream - the periodic broadcast as `temperature` events.
///
/// Ends when the daemon shuts down. A slow client skips readings rather
/// than holding up the broadcaster.
pub async fn temperature_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut readings = BroadcastStream::new(state.readings.subscribe());
    let shutdown = state.shutdown.clone();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                biased;
                item = readings.next() => match item {
                    Some(Ok(reading)) => {
                        if let Some(event) = json_event("temperature", &reading) {
                            yield Ok(event);
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(n))) => {
                        warn!(skipped = n, "temperature subscriber lagged");
                    }
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            }
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}

/// GET /api/goals/{id}/events - the execute phase as a stream.
///
/// Replays the feedback recorded so far, then follows live events until
/// the goal's `result` event, after which the stream ends. The live
/// subscription is taken before the snapshot is read, and live samples at
/// or below the last replayed `seq` are skipped, so every sample is sent
/// exactly once and in order.
pub async fn goal_events(
    State(state): State<AppState>,
    Path(goal_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let mut live = state.goal_events.subscribe();
    let snapshot = state
        .engine
        .snapshot(goal_id)?
        .ok_or_else(|| ApiError::NotFound(format!("goal {} not found", goal_id)))?;
    let engine = state.engine.clone();
    let shutdown = state.shutdown.clone();

    let stream = async_stream::stream! {
        let mut last_seq = 0;
        let mut finished = false;

        for event in replay(&snapshot, &mut last_seq, &mut finished) {
            yield Ok(event);
        }

        while !finished {
            let received = tokio::select! {
                biased;
                received = live.recv() => received,
                _ = shutdown.cancelled() => break,
            };

            match received {
                Ok(GoalEvent::Feedback(sample)) if sample.goal_id == goal_id => {
                    if sample.seq > last_seq {
                        last_seq = sample.seq;
                        if let Some(event) = feedback_event(&sample) {
                            yield Ok(event);
                        }
                    }
                }
                Ok(GoalEvent::GoalFinished(result)) if result.goal_id == goal_id => {
                    finished = true;
                    if let Some(event) = result_event(&result) {
                        yield Ok(event);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(%goal_id, skipped = n, "goal subscriber lagged, resyncing from snapshot");
                    match engine.snapshot(goal_id) {
                        Ok(Some(snapshot)) => {
                            for event in replay(&snapshot, &mut last_seq, &mut finished) {
                                yield Ok(event);
                            }
                        }
                        // A newer goal replaced this one; its result was lost with the lag.
                        Ok(None) => break,
                        Err(e) => {
                            warn!(%goal_id, "cannot resync goal stream: {}", e);
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!(%goal_id, "goal event stream closed");
    };

    Ok(Sse::new(stream).keep_alive(keep_alive()))
}

/// Events for everything in `snapshot` newer than `last_seq`, plus the
/// result if the goal has finished. Advances the cursor.
///
/// The snapshot only retains the newest samples; older ones the cursor has
/// not reached yet are gone and are logged as skipped.
fn replay(snapshot: &GoalSnapshot, last_seq: &mut u32, finished: &mut bool) -> Vec<Event> {
    if let Some(first) = snapshot.first_retained_seq() {
        if first > last_seq.saturating_add(1) {
            warn!(
                goal_id = %snapshot.goal.goal_id,
                skipped = first - *last_seq - 1,
                "feedback history trimmed past the stream cursor"
            );
        }
    }

    let mut events: Vec<Event> = snapshot
        .feedback
        .iter()
        .filter(|sample| sample.seq > *last_seq)
        .filter_map(feedback_event)
        .collect();
    *last_seq = (*last_seq).max(snapshot.last_seq());

    if let Some(result) = &snapshot.result {
        *finished = true;
        events.extend(result_event(result));
    }
    events
}
