//! HTTP route handlers for the controller API.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tc_goal::{AdmissionDecision, CancelResponse, GoalSnapshot, GoalState};
use tc_thermostat::{Direction, StepMutator, StepOutcome};
use uuid::Uuid;

use crate::error::ApiError;
use crate::sse;
use crate::state::AppState;

/// Build the API router (mounted under `/api`).
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/temperature", get(get_temperature))
        .route("/temperature/step", post(step_temperature))
        .route("/temperature/stream", get(sse::temperature_stream))
        .route("/goals", post(create_goal))
        .route("/goals/current", get(current_goal))
        .route("/goals/{goal_id}", get(get_goal).delete(cancel_goal))
        .route("/goals/{goal_id}/events", get(sse::goal_events))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemperatureResponse {
    pub value: i16,
}

/// GET /api/temperature - the query call.
async fn get_temperature(
    State(state): State<AppState>,
) -> Result<Json<TemperatureResponse>, ApiError> {
    let value = state.thermostat.current_value().await?;
    Ok(Json(TemperatureResponse { value }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StepRequest {
    pub direction: Direction,
}

/// POST /api/temperature/step - the mutate call. Usable while a goal runs.
async fn step_temperature(
    State(state): State<AppState>,
    Json(request): Json<StepRequest>,
) -> Result<Json<StepOutcome>, ApiError> {
    let outcome = state.thermostat.step(request.direction).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GoalRequest {
    pub target_value: i16,
}

/// Body of an accepted goal.
#[derive(Debug, Serialize, Deserialize)]
pub struct GoalAccepted {
    pub decision: AdmissionDecision,
    pub goal_id: Uuid,
    pub initial_value: i16,
    pub target_value: i16,
    pub direction: Direction,
    pub state: GoalState,
}

/// POST /api/goals - the accept phase. `202` on admission, `409` if busy.
///
/// The goal keeps running after this returns; progress is read from
/// `/api/goals/{id}/events`.
async fn create_goal(
    State(state): State<AppState>,
    Json(request): Json<GoalRequest>,
) -> Result<(StatusCode, Json<GoalAccepted>), ApiError> {
    let handle = state.engine.try_accept(request.target_value).await?;
    let goal = handle.goal();
    Ok((
        StatusCode::ACCEPTED,
        Json(GoalAccepted {
            decision: AdmissionDecision::Accept,
            goal_id: goal.goal_id,
            initial_value: goal.initial_value,
            target_value: goal.target_value,
            direction: goal.direction,
            state: goal.state.clone(),
        }),
    ))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelDecision {
    pub decision: CancelResponse,
    pub goal_id: Uuid,
}

/// DELETE /api/goals/{id} - the cancel phase. `202` accept, `409` reject.
async fn cancel_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let decision = state.engine.request_cancel(goal_id)?;
    let status = match decision {
        CancelResponse::Accept => StatusCode::ACCEPTED,
        CancelResponse::Reject => StatusCode::CONFLICT,
    };
    Ok((status, Json(CancelDecision { decision, goal_id })).into_response())
}

/// GET /api/goals/current - status of the most recent goal.
async fn current_goal(State(state): State<AppState>) -> Result<Json<GoalSnapshot>, ApiError> {
    state
        .engine
        .current()?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no goal has been submitted".to_string()))
}

/// GET /api/goals/{id}
async fn get_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<Uuid>,
) -> Result<Json<GoalSnapshot>, ApiError> {
    state
        .engine
        .snapshot(goal_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("goal {} not found", goal_id)))
}
