// error.rs - Error types for the daemon: config loading and HTTP responses.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tc_goal::{AdmissionDecision, GoalError};
use tc_thermostat::ThermostatError;
use thiserror::Error;

/// Errors from loading `tc.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors surfaced by HTTP handlers.
///
/// An admission rejection is a decision, so it maps to `409` with a
/// `"decision": "reject"` body rather than to a server error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Goal(#[from] GoalError),

    #[error(transparent)]
    Thermostat(#[from] ThermostatError),

    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Goal(GoalError::Rejected {
                target_value,
                active_goal_id,
            }) => (
                StatusCode::CONFLICT,
                Json(json!({
                    "decision": AdmissionDecision::Reject,
                    "target_value": target_value,
                    "active_goal_id": active_goal_id,
                    "error": "another goal is active",
                })),
            )
                .into_response(),
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            other => {
                tracing::error!("request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": other.to_string() })),
                )
                    .into_response()
            }
        }
    }
}
