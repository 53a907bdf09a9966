//! # tc-daemon
//!
//! HTTP and Server-Sent Events transport for the temperature controller.
//!
//! Exposes the thermostat's query and mutate calls, the periodic
//! temperature broadcast, and the goal protocol (accept, cancel, execute)
//! over a single axum router.
//!
//! ## Key components
//!
//! - [`DaemonConfig`]: `tc.toml` loading with per-field defaults
//! - [`AppState`]: thermostat, goal engine and broadcast channels
//! - [`app`]: the full router, `/api/...` plus CORS and request tracing
//! - [`ApiError`]: maps engine and thermostat errors onto HTTP statuses

pub mod config;
pub mod error;
pub mod routes;
pub mod sse;
pub mod state;

pub use config::{BroadcastConfig, DaemonConfig, ServerConfig};
pub use error::{ApiError, ConfigError};
pub use state::AppState;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", routes::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
