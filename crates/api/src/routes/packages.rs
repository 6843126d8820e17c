//! Membership package catalog routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListPackagesQuery {
    /// When true, inactive packages are included
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePackageRequest {
    pub name: String,
    pub description: Option<String>,
    pub duration_days: i32,
    pub price_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePackageRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_days: Option<i32>,
    pub price_cents: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PackageResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub duration_days: i32,
    pub price_cents: i64,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
}

const PACKAGE_COLUMNS: &str =
    "id, name, description, duration_days, price_cents, is_active, created_at";

// =============================================================================
// Handlers
// =============================================================================

/// List packages, active only by default
pub async fn list_packages(
    State(state): State<AppState>,
    Query(query): Query<ListPackagesQuery>,
) -> ApiResult<Json<Vec<PackageResponse>>> {
    let packages: Vec<PackageResponse> = sqlx::query_as(&format!(
        r#"
        SELECT {PACKAGE_COLUMNS}
        FROM packages
        WHERE is_active OR $1
        ORDER BY price_cents ASC
        "#
    ))
    .bind(query.include_inactive)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(packages))
}

/// Create a package
pub async fn create_package(
    State(state): State<AppState>,
    Json(req): Json<CreatePackageRequest>,
) -> ApiResult<(StatusCode, Json<PackageResponse>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("Package name is required".to_string()));
    }
    if req.duration_days <= 0 {
        return Err(ApiError::Validation(
            "Duration must be at least one day".to_string(),
        ));
    }
    if req.price_cents < 0 {
        return Err(ApiError::Validation("Price cannot be negative".to_string()));
    }

    let package: PackageResponse = sqlx::query_as(&format!(
        r#"
        INSERT INTO packages (id, name, description, duration_days, price_cents, is_active)
        VALUES ($1, $2, $3, $4, $5, TRUE)
        RETURNING {PACKAGE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(req.duration_days)
    .bind(req.price_cents)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(package_id = %package.id, name = %package.name, "Package created");

    Ok((StatusCode::CREATED, Json(package)))
}

/// Get a package by ID
pub async fn get_package(
    State(state): State<AppState>,
    Path(package_id): Path<Uuid>,
) -> ApiResult<Json<PackageResponse>> {
    let package: PackageResponse = sqlx::query_as(&format!(
        "SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = $1"
    ))
    .bind(package_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(package))
}

/// Update a package. Price and duration changes only affect subscriptions
/// created afterwards.
pub async fn update_package(
    State(state): State<AppState>,
    Path(package_id): Path<Uuid>,
    Json(req): Json<UpdatePackageRequest>,
) -> ApiResult<Json<PackageResponse>> {
    if let Some(days) = req.duration_days {
        if days <= 0 {
            return Err(ApiError::Validation(
                "Duration must be at least one day".to_string(),
            ));
        }
    }
    if let Some(price) = req.price_cents {
        if price < 0 {
            return Err(ApiError::Validation("Price cannot be negative".to_string()));
        }
    }

    let package: PackageResponse = sqlx::query_as(&format!(
        r#"
        UPDATE packages
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            duration_days = COALESCE($4, duration_days),
            price_cents = COALESCE($5, price_cents),
            is_active = COALESCE($6, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {PACKAGE_COLUMNS}
        "#
    ))
    .bind(package_id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(req.duration_days)
    .bind(req.price_cents)
    .bind(req.is_active)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(package))
}

/// Delete a package. Packages referenced by subscriptions are deactivated
/// instead of removed, keeping subscription history intact.
pub async fn delete_package(
    State(state): State<AppState>,
    Path(package_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let (referenced,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE package_id = $1")
            .bind(package_id)
            .fetch_one(&state.pool)
            .await?;

    if referenced > 0 {
        let updated = sqlx::query(
            "UPDATE packages SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(package_id)
        .execute(&state.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(ApiError::NotFound);
        }

        tracing::info!(package_id = %package_id, "Package deactivated (in use)");
        return Ok(StatusCode::NO_CONTENT);
    }

    let deleted = sqlx::query("DELETE FROM packages WHERE id = $1")
        .bind(package_id)
        .execute(&state.pool)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}
