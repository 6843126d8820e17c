//! Staff authentication routes

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{hash_password, verify_password, AuthUser},
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: StaffUserResponse,
}

#[derive(Debug, Serialize)]
pub struct StaffUserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
struct StaffUserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    full_name: String,
    role: String,
    created_at: OffsetDateTime,
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a staff account. The first account becomes admin.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("A valid email is required".to_string()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if req.full_name.trim().is_empty() {
        return Err(ApiError::Validation("Full name is required".to_string()));
    }

    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM staff_users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(ApiError::EmailAlreadyExists);
    }

    let password_hash =
        hash_password(&req.password).map_err(|e| ApiError::Validation(e.to_string()))?;

    // First registered account is the admin
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM staff_users")
        .fetch_one(&state.pool)
        .await?;
    let role = if count == 0 { "admin" } else { "staff" };

    let user: StaffUserRow = sqlx::query_as(
        r#"
        INSERT INTO staff_users (id, email, password_hash, full_name, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, email, password_hash, full_name, role, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&password_hash)
    .bind(req.full_name.trim())
    .bind(role)
    .fetch_one(&state.pool)
    .await?;

    let token = state
        .jwt
        .generate_token(user.id, &user.role, &user.email)
        .map_err(|_| ApiError::Internal)?;

    tracing::info!(user_id = %user.id, role = %user.role, "Staff account registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: StaffUserResponse {
                id: user.id,
                email: user.email,
                full_name: user.full_name,
                role: user.role,
                created_at: user.created_at,
            },
        }),
    ))
}

/// Log in with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = req.email.trim().to_lowercase();

    let user: Option<StaffUserRow> = sqlx::query_as(
        r#"
        SELECT id, email, password_hash, full_name, role, created_at
        FROM staff_users
        WHERE email = $1
        "#,
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?;

    let user = user.ok_or(ApiError::InvalidCredentials)?;

    let valid = verify_password(&req.password, &user.password_hash)
        .map_err(|_| ApiError::InvalidCredentials)?;
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .jwt
        .generate_token(user.id, &user.role, &user.email)
        .map_err(|_| ApiError::Internal)?;

    Ok(Json(AuthResponse {
        token,
        user: StaffUserResponse {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            created_at: user.created_at,
        },
    }))
}

/// Return the authenticated staff user
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<StaffUserResponse>> {
    let user: StaffUserRow = sqlx::query_as(
        r#"
        SELECT id, email, password_hash, full_name, role, created_at
        FROM staff_users
        WHERE id = $1
        "#,
    )
    .bind(auth_user.user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(StaffUserResponse {
        id: user.id,
        email: user.email,
        full_name: user.full_name,
        role: user.role,
        created_at: user.created_at,
    }))
}
