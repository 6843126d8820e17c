//! Coupon catalog and redemption routes
//!
//! Validation is a read-only quote; redemption increments the usage counter
//! atomically so the cap holds under concurrent redemptions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use gymtrack_shared::{CouponQuote, CouponRules, DiscountType};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub discount_type: DiscountType,
    /// Percent (0-100) for percentage coupons, cents for fixed coupons
    pub value: i64,
    pub valid_from: OffsetDateTime,
    pub valid_until: OffsetDateTime,
    pub max_uses: Option<i32>,
    pub min_amount_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCouponRequest {
    pub valid_until: Option<OffsetDateTime>,
    pub max_uses: Option<i32>,
    pub min_amount_cents: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub amount_cents: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub value: i64,
    pub valid_from: OffsetDateTime,
    pub valid_until: OffsetDateTime,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub min_amount_cents: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, FromRow)]
struct CouponRow {
    id: Uuid,
    #[sqlx(flatten)]
    rules: CouponRules,
}

const COUPON_COLUMNS: &str = "id, code, discount_type, value, valid_from, valid_until, \
     max_uses, used_count, min_amount_cents, is_active";

const RULE_COLUMNS: &str = "id, discount_type, value, valid_from, valid_until, max_uses, \
     used_count, min_amount_cents, is_active";

// =============================================================================
// Handlers
// =============================================================================

/// List all coupons, newest first
pub async fn list_coupons(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<CouponResponse>>> {
    let coupons: Vec<CouponResponse> = sqlx::query_as(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY valid_from DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(coupons))
}

/// Create a coupon. Codes are stored uppercase and must be unique.
pub async fn create_coupon(
    State(state): State<AppState>,
    Json(req): Json<CreateCouponRequest>,
) -> ApiResult<(StatusCode, Json<CouponResponse>)> {
    let code = req.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(ApiError::Validation("Coupon code is required".to_string()));
    }
    match req.discount_type {
        DiscountType::Percentage => {
            if !(1..=100).contains(&req.value) {
                return Err(ApiError::Validation(
                    "Percentage must be between 1 and 100".to_string(),
                ));
            }
        }
        DiscountType::Fixed => {
            if req.value <= 0 {
                return Err(ApiError::Validation(
                    "Fixed discount must be positive".to_string(),
                ));
            }
        }
    }
    if req.valid_until <= req.valid_from {
        return Err(ApiError::Validation(
            "Validity window must end after it starts".to_string(),
        ));
    }
    if matches!(req.max_uses, Some(n) if n <= 0) {
        return Err(ApiError::Validation("Max uses must be positive".to_string()));
    }

    let coupon: CouponResponse = sqlx::query_as(&format!(
        r#"
        INSERT INTO coupons (id, code, discount_type, value, valid_from, valid_until,
                             max_uses, min_amount_cents, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
        RETURNING {COUPON_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&code)
    .bind(req.discount_type)
    .bind(req.value)
    .bind(req.valid_from)
    .bind(req.valid_until)
    .bind(req.max_uses)
    .bind(req.min_amount_cents)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon created");

    Ok((StatusCode::CREATED, Json(coupon)))
}

/// Update a coupon's validity window, cap, minimum, or active flag
pub async fn update_coupon(
    State(state): State<AppState>,
    Path(coupon_id): Path<Uuid>,
    Json(req): Json<UpdateCouponRequest>,
) -> ApiResult<Json<CouponResponse>> {
    let coupon: CouponResponse = sqlx::query_as(&format!(
        r#"
        UPDATE coupons
        SET valid_until = COALESCE($2, valid_until),
            max_uses = COALESCE($3, max_uses),
            min_amount_cents = COALESCE($4, min_amount_cents),
            is_active = COALESCE($5, is_active)
        WHERE id = $1
        RETURNING {COUPON_COLUMNS}
        "#
    ))
    .bind(coupon_id)
    .bind(req.valid_until)
    .bind(req.max_uses)
    .bind(req.min_amount_cents)
    .bind(req.is_active)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(coupon))
}

/// Delete a coupon
pub async fn delete_coupon(
    State(state): State<AppState>,
    Path(coupon_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let deleted = sqlx::query("DELETE FROM coupons WHERE id = $1")
        .bind(coupon_id)
        .execute(&state.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Quote a coupon against an amount without redeeming it
pub async fn validate_coupon(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<QuoteRequest>,
) -> ApiResult<Json<CouponQuote>> {
    if req.amount_cents <= 0 {
        return Err(ApiError::Validation("Amount must be positive".to_string()));
    }

    let rules = load_rules(&state, &code).await?;
    let quote = rules
        .validate(req.amount_cents, OffsetDateTime::now_utc())
        .map_err(|rejection| ApiError::BadRequest(rejection.to_string()))?;

    Ok(Json(quote))
}

/// Redeem a coupon against an amount: quote it, then increment the usage
/// counter. The increment re-checks the cap so two racing redemptions cannot
/// both take the last use.
pub async fn redeem_coupon(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<QuoteRequest>,
) -> ApiResult<Json<CouponQuote>> {
    if req.amount_cents <= 0 {
        return Err(ApiError::Validation("Amount must be positive".to_string()));
    }

    let code = code.trim().to_uppercase();
    let mut tx = state.pool.begin().await?;

    let row: Option<CouponRow> = sqlx::query_as(&format!(
        "SELECT {RULE_COLUMNS} FROM coupons WHERE code = $1 FOR UPDATE"
    ))
    .bind(&code)
    .fetch_optional(&mut *tx)
    .await?;
    let coupon = row.ok_or(ApiError::NotFound)?;

    let quote = coupon
        .rules
        .validate(req.amount_cents, OffsetDateTime::now_utc())
        .map_err(|rejection| ApiError::BadRequest(rejection.to_string()))?;

    sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE id = $1")
        .bind(coupon.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(code = %code, discount_cents = quote.discount_cents, "Coupon redeemed");

    Ok(Json(quote))
}

// =============================================================================
// Internal Helpers
// =============================================================================

async fn load_rules(state: &AppState, code: &str) -> ApiResult<CouponRules> {
    let code = code.trim().to_uppercase();
    let rules: Option<CouponRules> = sqlx::query_as(
        r#"
        SELECT discount_type, value, valid_from, valid_until, max_uses,
               used_count, min_amount_cents, is_active
        FROM coupons
        WHERE code = $1
        "#,
    )
    .bind(&code)
    .fetch_optional(&state.pool)
    .await?;

    rules.ok_or(ApiError::NotFound)
}
