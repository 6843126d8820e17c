//! Authentication middleware

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated staff user, attached as a request extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
    pub email: String,
}

impl AuthUser {
    /// Admins can manage staff accounts and hard-delete records
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Require a valid Bearer token; attaches `AuthUser` on success
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state
        .jwt
        .validate_token(token)
        .map_err(|_| ApiError::InvalidToken)?;

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        role: claims.role,
        email: claims.email,
    });

    Ok(next.run(request).await)
}
