//! Stripe webhook endpoint
//!
//! Public route: authentication is the gateway signature, not a JWT. The raw
//! body is taken as a `String` so the signature is verified over exactly the
//! bytes Stripe signed.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Verify and dispatch a gateway webhook event
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<StatusCode> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing stripe-signature header".to_string()))?;

    let event = billing.webhooks.verify_event(&body, signature)?;

    tracing::debug!(event_id = %event.id, event_type = %event.type_, "Webhook event received");

    billing.webhooks.handle_event(event).await?;

    Ok(StatusCode::OK)
}
