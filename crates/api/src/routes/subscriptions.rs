//! Subscription lifecycle routes
//!
//! Subscriptions move between four states: active, frozen, expired, and
//! cancelled. Freezing pauses an active subscription and pushes its end date
//! out by the freeze length; unfreezing resumes it. Renewal expires the
//! current subscription and opens a fresh one starting today.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use gymtrack_shared::{CouponRules, Pagination, PaymentMethod, SubscriptionStatus};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

use super::payments::new_receipt_number;

// =============================================================================
// Date Helpers
// =============================================================================

/// End date for a subscription starting on `start` and running `duration_days`
pub(crate) fn end_date_for(start: Date, duration_days: i32) -> Date {
    start + Duration::days(i64::from(duration_days))
}

/// New end date after freezing for `freeze_days`
pub(crate) fn extended_end_date(end: Date, freeze_days: i32) -> Date {
    end + Duration::days(i64::from(freeze_days))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub member_id: Option<Uuid>,
    pub status: Option<SubscriptionStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub member_id: Uuid,
    pub package_id: Uuid,
    pub start_date: Option<Date>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FreezeRequest {
    pub reason: String,
    pub days: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenewRequest {
    /// Renew onto a different package; defaults to the current one
    pub package_id: Option<Uuid>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionListResponse {
    pub subscriptions: Vec<SubscriptionResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, FromRow)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub member_id: Uuid,
    pub member_name: String,
    pub package_id: Uuid,
    pub package_name: String,
    pub start_date: Date,
    pub end_date: Date,
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub status: SubscriptionStatus,
    pub freeze_reason: Option<String>,
    pub freeze_start: Option<Date>,
    pub freeze_end: Option<Date>,
    pub notes: Option<String>,
    pub created_at: OffsetDateTime,
}

const SUBSCRIPTION_COLUMNS: &str = "s.id, s.member_id, m.full_name AS member_name, \
     s.package_id, p.name AS package_name, s.start_date, s.end_date, s.amount_cents, \
     s.discount_cents, s.status, s.freeze_reason, s.freeze_start, s.freeze_end, s.notes, \
     s.created_at";

const SUBSCRIPTION_JOINS: &str = "FROM subscriptions s \
     JOIN members m ON m.id = s.member_id \
     JOIN packages p ON p.id = s.package_id";

// =============================================================================
// Handlers
// =============================================================================

/// List subscriptions with member/status filters and pagination
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<ListSubscriptionsQuery>,
) -> ApiResult<Json<SubscriptionListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let subscriptions: Vec<SubscriptionResponse> = sqlx::query_as(&format!(
        r#"
        SELECT {SUBSCRIPTION_COLUMNS}
        {SUBSCRIPTION_JOINS}
        WHERE ($1::UUID IS NULL OR s.member_id = $1)
          AND ($2::VARCHAR IS NULL OR s.status = $2)
        ORDER BY s.created_at DESC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(query.member_id)
    .bind(query.status)
    .bind(limit)
    .bind((page - 1) * limit)
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM subscriptions s
        WHERE ($1::UUID IS NULL OR s.member_id = $1)
          AND ($2::VARCHAR IS NULL OR s.status = $2)
        "#,
    )
    .bind(query.member_id)
    .bind(query.status)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(SubscriptionListResponse {
        subscriptions,
        pagination: Pagination::new(total, page, limit),
    }))
}

/// Create a subscription for a member.
///
/// The package sets price and duration. An optional coupon is validated and
/// redeemed atomically; its discount reduces the charged amount. A completed
/// payment and an income transaction are recorded alongside the subscription.
pub async fn create_subscription(
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<SubscriptionResponse>)> {
    let mut tx = state.pool.begin().await?;

    let member: Option<(String,)> = sqlx::query_as("SELECT full_name FROM members WHERE id = $1")
        .bind(req.member_id)
        .fetch_optional(&mut *tx)
        .await?;
    if member.is_none() {
        return Err(ApiError::BadRequest("Member not found".to_string()));
    }

    let pkg: Option<(i32, i64, String)> = sqlx::query_as(
        "SELECT duration_days, price_cents, name FROM packages WHERE id = $1 AND is_active",
    )
    .bind(req.package_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (duration_days, price_cents, package_name) =
        pkg.ok_or_else(|| ApiError::BadRequest("Package not found".to_string()))?;

    // Validate and redeem the coupon inside the transaction so the usage
    // counter can never exceed max_uses under concurrent redemptions.
    let mut discount_cents = 0i64;
    if let Some(code) = req.coupon_code.as_deref() {
        #[derive(FromRow)]
        struct CouponRow {
            id: Uuid,
            #[sqlx(flatten)]
            rules: CouponRules,
        }

        let code = code.trim().to_uppercase();
        let coupon: Option<CouponRow> = sqlx::query_as(
            r#"
            SELECT id, discount_type, value, valid_from, valid_until,
                   max_uses, used_count, min_amount_cents, is_active
            FROM coupons
            WHERE code = $1
            FOR UPDATE
            "#,
        )
        .bind(&code)
        .fetch_optional(&mut *tx)
        .await?;

        let coupon =
            coupon.ok_or_else(|| ApiError::BadRequest("Coupon not found".to_string()))?;

        let quote = coupon
            .rules
            .validate(price_cents, OffsetDateTime::now_utc())
            .map_err(|rejection| ApiError::BadRequest(rejection.to_string()))?;
        discount_cents = quote.discount_cents;

        sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE id = $1")
            .bind(coupon.id)
            .execute(&mut *tx)
            .await?;
    }

    let amount_cents = price_cents - discount_cents;
    let start_date = req
        .start_date
        .unwrap_or_else(|| OffsetDateTime::now_utc().date());
    let end_date = end_date_for(start_date, duration_days);
    let method = req.payment_method.unwrap_or(PaymentMethod::Cash);

    let subscription_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO subscriptions (id, member_id, package_id, start_date, end_date,
                                   amount_cents, discount_cents, payment_method, notes, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'active')
        "#,
    )
    .bind(subscription_id)
    .bind(req.member_id)
    .bind(req.package_id)
    .bind(start_date)
    .bind(end_date)
    .bind(amount_cents)
    .bind(discount_cents)
    .bind(method)
    .bind(&req.notes)
    .execute(&mut *tx)
    .await?;

    // Nothing changes hands for a fully discounted (or free) subscription,
    // so there is no payment or ledger entry to write.
    if amount_cents > 0 {
        let receipt = new_receipt_number();
        sqlx::query(
            r#"
            INSERT INTO payments (id, member_id, amount_cents, method, status,
                                  receipt_number, description, paid_at)
            VALUES ($1, $2, $3, $4, 'completed', $5, $6, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(req.member_id)
        .bind(amount_cents)
        .bind(method)
        .bind(&receipt)
        .bind(format!("Subscription {}", package_name))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, type, amount_cents, member_id, description, reference)
            VALUES ($1, 'income', $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(amount_cents)
        .bind(req.member_id)
        .bind(format!("Payment - {}", receipt))
        .bind(&receipt)
        .execute(&mut *tx)
        .await?;
    }

    let subscription = fetch_subscription(&mut tx, subscription_id).await?;
    tx.commit().await?;

    tracing::info!(
        subscription_id = %subscription_id,
        member_id = %req.member_id,
        amount_cents,
        discount_cents,
        "Subscription created"
    );

    Ok((StatusCode::CREATED, Json(subscription)))
}

/// Active subscriptions ending within the next N days (default 7)
pub async fn expiring_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> ApiResult<Json<Vec<SubscriptionResponse>>> {
    let days = query.days.unwrap_or(7).clamp(0, 365);

    let subscriptions: Vec<SubscriptionResponse> = sqlx::query_as(&format!(
        r#"
        SELECT {SUBSCRIPTION_COLUMNS}
        {SUBSCRIPTION_JOINS}
        WHERE s.status = 'active'
          AND s.end_date >= CURRENT_DATE
          AND s.end_date <= CURRENT_DATE + $1::INT
        ORDER BY s.end_date ASC
        "#
    ))
    .bind(days as i32)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(subscriptions))
}

/// Get a subscription by ID
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let subscription: SubscriptionResponse = sqlx::query_as(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} {SUBSCRIPTION_JOINS} WHERE s.id = $1"
    ))
    .bind(subscription_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(subscription))
}

/// Cancel a subscription (allowed from any non-terminal state)
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let mut tx = state.pool.begin().await?;

    let status = current_status(&mut tx, subscription_id).await?;
    if status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Cannot cancel a {} subscription",
            status.as_str()
        )));
    }

    sqlx::query(
        "UPDATE subscriptions SET status = 'cancelled', updated_at = NOW() WHERE id = $1",
    )
    .bind(subscription_id)
    .execute(&mut *tx)
    .await?;

    let subscription = fetch_subscription(&mut tx, subscription_id).await?;
    tx.commit().await?;

    tracing::info!(subscription_id = %subscription_id, "Subscription cancelled");

    Ok(Json(subscription))
}

/// Freeze an active subscription for a number of days.
/// The end date is pushed out by the freeze length so no paid time is lost.
pub async fn freeze_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Json(req): Json<FreezeRequest>,
) -> ApiResult<Json<SubscriptionResponse>> {
    if req.days <= 0 {
        return Err(ApiError::Validation(
            "Freeze length must be at least one day".to_string(),
        ));
    }
    if req.reason.trim().is_empty() {
        return Err(ApiError::Validation("Freeze reason is required".to_string()));
    }

    let mut tx = state.pool.begin().await?;

    let status = current_status(&mut tx, subscription_id).await?;
    if !status.can_freeze() {
        return Err(ApiError::Conflict(format!(
            "Only active subscriptions can be frozen (current: {})",
            status.as_str()
        )));
    }

    let today = OffsetDateTime::now_utc().date();
    let freeze_end = extended_end_date(today, req.days);

    sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'frozen',
            freeze_reason = $2,
            freeze_start = $3,
            freeze_end = $4,
            end_date = end_date + $5::INT,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(subscription_id)
    .bind(req.reason.trim())
    .bind(today)
    .bind(freeze_end)
    .bind(req.days)
    .execute(&mut *tx)
    .await?;

    let subscription = fetch_subscription(&mut tx, subscription_id).await?;
    tx.commit().await?;

    tracing::info!(
        subscription_id = %subscription_id,
        days = req.days,
        "Subscription frozen"
    );

    Ok(Json(subscription))
}

/// Resume a frozen subscription, clearing the freeze window
pub async fn unfreeze_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let mut tx = state.pool.begin().await?;

    let status = current_status(&mut tx, subscription_id).await?;
    if !status.can_unfreeze() {
        return Err(ApiError::Conflict(format!(
            "Only frozen subscriptions can be unfrozen (current: {})",
            status.as_str()
        )));
    }

    sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'active',
            freeze_reason = NULL,
            freeze_start = NULL,
            freeze_end = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(subscription_id)
    .execute(&mut *tx)
    .await?;

    let subscription = fetch_subscription(&mut tx, subscription_id).await?;
    tx.commit().await?;

    tracing::info!(subscription_id = %subscription_id, "Subscription unfrozen");

    Ok(Json(subscription))
}

/// Renew a subscription: the current one is expired and a new active one
/// starts today, paid in full. The body may move the member onto a different
/// package or record a different payment method; both default to the
/// current subscription's values.
pub async fn renew_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    body: Option<Json<RenewRequest>>,
) -> ApiResult<(StatusCode, Json<SubscriptionResponse>)> {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let mut tx = state.pool.begin().await?;

    let old: Option<(Uuid, Uuid, SubscriptionStatus)> = sqlx::query_as(
        "SELECT member_id, package_id, status FROM subscriptions WHERE id = $1 FOR UPDATE",
    )
    .bind(subscription_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (member_id, old_package_id, status) = old.ok_or(ApiError::NotFound)?;

    if status == SubscriptionStatus::Cancelled {
        return Err(ApiError::Conflict(
            "Cannot renew a cancelled subscription".to_string(),
        ));
    }

    let package_id = req.package_id.unwrap_or(old_package_id);
    let pkg: Option<(i32, i64, String)> = sqlx::query_as(
        "SELECT duration_days, price_cents, name FROM packages WHERE id = $1",
    )
    .bind(package_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (duration_days, price_cents, package_name) =
        pkg.ok_or_else(|| ApiError::BadRequest("Package not found".to_string()))?;

    sqlx::query(
        "UPDATE subscriptions SET status = 'expired', updated_at = NOW() WHERE id = $1 AND status != 'expired'",
    )
    .bind(subscription_id)
    .execute(&mut *tx)
    .await?;

    let start_date = OffsetDateTime::now_utc().date();
    let end_date = end_date_for(start_date, duration_days);
    let method = req.payment_method.unwrap_or(PaymentMethod::Cash);
    let new_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO subscriptions (id, member_id, package_id, start_date, end_date,
                                   amount_cents, payment_method, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')
        "#,
    )
    .bind(new_id)
    .bind(member_id)
    .bind(package_id)
    .bind(start_date)
    .bind(end_date)
    .bind(price_cents)
    .bind(method)
    .execute(&mut *tx)
    .await?;

    if price_cents > 0 {
        let receipt = new_receipt_number();
        sqlx::query(
            r#"
            INSERT INTO payments (id, member_id, amount_cents, method, status,
                                  receipt_number, description, paid_at)
            VALUES ($1, $2, $3, $4, 'completed', $5, $6, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(price_cents)
        .bind(method)
        .bind(&receipt)
        .bind(format!("Renewal {}", package_name))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, type, amount_cents, member_id, description, reference)
            VALUES ($1, 'income', $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(price_cents)
        .bind(member_id)
        .bind(format!("Payment - {}", receipt))
        .bind(&receipt)
        .execute(&mut *tx)
        .await?;
    }

    let subscription = fetch_subscription(&mut tx, new_id).await?;
    tx.commit().await?;

    tracing::info!(
        old_subscription_id = %subscription_id,
        new_subscription_id = %new_id,
        "Subscription renewed"
    );

    Ok((StatusCode::CREATED, Json(subscription)))
}

// =============================================================================
// Internal Helpers
// =============================================================================

async fn current_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subscription_id: Uuid,
) -> ApiResult<SubscriptionStatus> {
    let row: Option<(SubscriptionStatus,)> =
        sqlx::query_as("SELECT status FROM subscriptions WHERE id = $1 FOR UPDATE")
            .bind(subscription_id)
            .fetch_optional(&mut **tx)
            .await?;
    row.map(|(s,)| s).ok_or(ApiError::NotFound)
}

async fn fetch_subscription(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subscription_id: Uuid,
) -> ApiResult<SubscriptionResponse> {
    let subscription: SubscriptionResponse = sqlx::query_as(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} {SUBSCRIPTION_JOINS} WHERE s.id = $1"
    ))
    .bind(subscription_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(subscription)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn end_date_adds_duration_days() {
        assert_eq!(end_date_for(date!(2025 - 01 - 01), 30), date!(2025 - 01 - 31));
        assert_eq!(end_date_for(date!(2025 - 01 - 31), 30), date!(2025 - 03 - 02));
    }

    #[test]
    fn end_date_crosses_year_boundary() {
        assert_eq!(end_date_for(date!(2025 - 12 - 15), 30), date!(2026 - 01 - 14));
    }

    #[test]
    fn freeze_extends_end_date_by_freeze_length() {
        assert_eq!(
            extended_end_date(date!(2025 - 06 - 10), 14),
            date!(2025 - 06 - 24)
        );
    }

    // =========================================================================
    // Database tests (require DATABASE_URL)
    // =========================================================================

    use sqlx::PgPool;

    use crate::config::Config;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = gymtrack_shared::create_pool(&url, 3).await.unwrap();
        gymtrack_shared::run_migrations(&pool).await.unwrap();
        pool
    }

    fn test_state(pool: PgPool) -> AppState {
        AppState::new(
            pool,
            Config {
                bind_address: "127.0.0.1:0".to_string(),
                database_url: String::new(),
                database_max_connections: 3,
                jwt_secret: "unit-test-secret-at-least-32-characters!!".to_string(),
                jwt_expiry_hours: 24,
                stripe_secret_key: String::new(),
                stripe_webhook_secret: String::new(),
                enable_card_payments: false,
            },
        )
    }

    async fn seed_member(pool: &PgPool) -> Uuid {
        let id = Uuid::new_v4();
        let number = format!("T{}", &id.simple().to_string()[..12]);
        sqlx::query(
            "INSERT INTO members (id, member_number, full_name, phone) VALUES ($1, $2, 'Test Member', '555-0100')",
        )
        .bind(id)
        .bind(number)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn seed_package(pool: &PgPool, duration_days: i32, price_cents: i64) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO packages (id, name, duration_days, price_cents) VALUES ($1, 'Test Package', $2, $3)",
        )
        .bind(id)
        .bind(duration_days)
        .bind(price_cents)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn seed_full_discount_coupon(pool: &PgPool) -> String {
        let id = Uuid::new_v4();
        let code = format!("FREE{}", &id.simple().to_string()[..8].to_uppercase());
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, discount_type, value, valid_from, valid_until)
            VALUES ($1, $2, 'percentage', 100, NOW() - INTERVAL '1 day', NOW() + INTERVAL '1 day')
            "#,
        )
        .bind(id)
        .bind(&code)
        .execute(pool)
        .await
        .unwrap();
        code
    }

    fn create_request(member_id: Uuid, package_id: Uuid) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            member_id,
            package_id,
            start_date: None,
            payment_method: None,
            coupon_code: None,
            notes: None,
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn renew_expires_old_subscription_and_creates_one_new_active() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());

        let member_id = seed_member(&pool).await;
        let package_id = seed_package(&pool, 30, 10_000).await;
        let upgrade_id = seed_package(&pool, 90, 25_000).await;

        let (_, Json(created)) = create_subscription(
            State(state.clone()),
            Json(create_request(member_id, package_id)),
        )
        .await
        .unwrap();

        let (_, Json(renewed)) = renew_subscription(
            State(state),
            Path(created.id),
            Some(Json(RenewRequest {
                package_id: Some(upgrade_id),
                payment_method: Some(PaymentMethod::BankTransfer),
            })),
        )
        .await
        .unwrap();

        assert_ne!(renewed.id, created.id);
        assert_eq!(renewed.status, SubscriptionStatus::Active);
        assert_eq!(renewed.package_id, upgrade_id);
        assert_eq!(renewed.amount_cents, 25_000);

        let (old_status,): (SubscriptionStatus,) =
            sqlx::query_as("SELECT status FROM subscriptions WHERE id = $1")
                .bind(created.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(old_status, SubscriptionStatus::Expired);

        let (active,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM subscriptions WHERE member_id = $1 AND status = 'active'",
        )
        .bind(member_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn full_discount_coupon_creates_subscription_without_payment() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());

        let member_id = seed_member(&pool).await;
        let package_id = seed_package(&pool, 30, 10_000).await;
        let code = seed_full_discount_coupon(&pool).await;

        let mut req = create_request(member_id, package_id);
        req.coupon_code = Some(code);

        let (_, Json(subscription)) = create_subscription(State(state), Json(req))
            .await
            .unwrap();

        assert_eq!(subscription.amount_cents, 0);
        assert_eq!(subscription.discount_cents, 10_000);
        assert_eq!(subscription.status, SubscriptionStatus::Active);

        // Nothing was charged, so no payment or ledger row exists
        let (payments,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM payments WHERE member_id = $1")
                .bind(member_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(payments, 0);

        let (ledger,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE member_id = $1")
                .bind(member_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(ledger, 0);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn free_package_creates_subscription_without_payment() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());

        let member_id = seed_member(&pool).await;
        let package_id = seed_package(&pool, 7, 0).await;

        let (_, Json(subscription)) = create_subscription(
            State(state),
            Json(create_request(member_id, package_id)),
        )
        .await
        .unwrap();

        assert_eq!(subscription.amount_cents, 0);

        let (payments,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM payments WHERE member_id = $1")
                .bind(member_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(payments, 0);
    }
}
