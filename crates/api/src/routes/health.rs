//! Health and readiness probes

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    /// Whether the card gateway is configured
    pub card_payments: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Full health report: service identity plus database reachability
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_up = database_reachable(&state).await;

    let code = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthResponse {
            status: if database_up { "ok" } else { "degraded" },
            service: "gymtrack-api",
            version: env!("CARGO_PKG_VERSION"),
            database: if database_up { "reachable" } else { "unreachable" },
            card_payments: state.billing.is_some(),
        }),
    )
}

/// Liveness probe: the process is up
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: traffic can be served only with a working database
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if database_reachable(&state).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

// =============================================================================
// Internal Helpers
// =============================================================================

async fn database_reachable(state: &AppState) -> bool {
    sqlx::query("SELECT 1").execute(&state.pool).await.is_ok()
}
