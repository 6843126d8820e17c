//! Payment ledger routes
//!
//! Cash and bank-transfer payments settle at the counter: the row is written
//! as completed, an income transaction is recorded, and any linked invoice is
//! closed in the same database transaction. Card payments are written as
//! pending with a gateway payment intent; the webhook settles them later.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use gymtrack_billing::webhooks::close_invoice_if_settled;
use gymtrack_shared::{Pagination, PaymentMethod, PaymentStatus};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Receipt numbers carry an `RCP` prefix over the issue timestamp in
/// milliseconds, matching the format printed on counter receipts.
pub(crate) fn new_receipt_number() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!("RCP{}", millis)
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    pub member_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub method: Option<PaymentMethod>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub member_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<PaymentResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub member_id: Uuid,
    pub member_name: String,
    pub invoice_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub receipt_number: String,
    pub description: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub paid_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub payment: PaymentResponse,
    /// Present for card payments; the client confirms the charge with it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

const PAYMENT_COLUMNS: &str = "p.id, p.member_id, m.full_name AS member_name, p.invoice_id, \
     p.amount_cents, p.currency, p.method, p.status, p.receipt_number, p.description, \
     p.stripe_payment_intent_id, p.paid_at, p.created_at";

const PAYMENT_JOINS: &str = "FROM payments p JOIN members m ON m.id = p.member_id";

// =============================================================================
// Handlers
// =============================================================================

/// List payments with member/status/method filters and pagination
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
) -> ApiResult<Json<PaymentListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let payments: Vec<PaymentResponse> = sqlx::query_as(&format!(
        r#"
        SELECT {PAYMENT_COLUMNS}
        {PAYMENT_JOINS}
        WHERE ($1::UUID IS NULL OR p.member_id = $1)
          AND ($2::VARCHAR IS NULL OR p.status = $2)
          AND ($3::VARCHAR IS NULL OR p.method = $3)
        ORDER BY p.created_at DESC
        LIMIT $4 OFFSET $5
        "#
    ))
    .bind(query.member_id)
    .bind(query.status)
    .bind(query.method)
    .bind(limit)
    .bind((page - 1) * limit)
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM payments p
        WHERE ($1::UUID IS NULL OR p.member_id = $1)
          AND ($2::VARCHAR IS NULL OR p.status = $2)
          AND ($3::VARCHAR IS NULL OR p.method = $3)
        "#,
    )
    .bind(query.member_id)
    .bind(query.status)
    .bind(query.method)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(PaymentListResponse {
        payments,
        pagination: Pagination::new(total, page, limit),
    }))
}

/// Record a payment.
///
/// Counter methods settle immediately; card payments open a gateway payment
/// intent and stay pending until the webhook reports the outcome.
pub async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<CreatePaymentResponse>)> {
    if req.amount_cents <= 0 {
        return Err(ApiError::Validation(
            "Payment amount must be positive".to_string(),
        ));
    }

    let member: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM members WHERE id = $1")
        .bind(req.member_id)
        .fetch_optional(&state.pool)
        .await?;
    if member.is_none() {
        return Err(ApiError::BadRequest("Member not found".to_string()));
    }

    if let Some(invoice_id) = req.invoice_id {
        let invoice: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM invoices WHERE id = $1 AND status NOT IN ('paid', 'cancelled')",
        )
        .bind(invoice_id)
        .fetch_optional(&state.pool)
        .await?;
        if invoice.is_none() {
            return Err(ApiError::BadRequest(
                "Invoice not found or not payable".to_string(),
            ));
        }
    }

    let payment_id = Uuid::new_v4();
    let receipt = new_receipt_number();

    if req.method.settles_via_gateway() {
        let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

        // Open the intent first so its ID lands on the pending row; the
        // webhook matches on it when the charge settles.
        let charge = billing
            .charges
            .create_card_charge(
                payment_id,
                req.member_id,
                req.amount_cents,
                req.description.as_deref(),
            )
            .await?;

        sqlx::query(
            r#"
            INSERT INTO payments (id, member_id, invoice_id, amount_cents, method, status,
                                  receipt_number, description, stripe_payment_intent_id)
            VALUES ($1, $2, $3, $4, 'card', 'pending', $5, $6, $7)
            "#,
        )
        .bind(payment_id)
        .bind(req.member_id)
        .bind(req.invoice_id)
        .bind(req.amount_cents)
        .bind(&receipt)
        .bind(&req.description)
        .bind(&charge.payment_intent_id)
        .execute(&state.pool)
        .await?;

        let payment = fetch_payment(&state, payment_id).await?;

        tracing::info!(
            payment_id = %payment_id,
            payment_intent_id = %charge.payment_intent_id,
            amount_cents = req.amount_cents,
            "Card payment opened"
        );

        return Ok((
            StatusCode::CREATED,
            Json(CreatePaymentResponse {
                payment,
                client_secret: charge.client_secret,
            }),
        ));
    }

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO payments (id, member_id, invoice_id, amount_cents, method, status,
                              receipt_number, description, paid_at)
        VALUES ($1, $2, $3, $4, $5, 'completed', $6, $7, NOW())
        "#,
    )
    .bind(payment_id)
    .bind(req.member_id)
    .bind(req.invoice_id)
    .bind(req.amount_cents)
    .bind(req.method)
    .bind(&receipt)
    .bind(&req.description)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO transactions (id, type, amount_cents, member_id, description, reference)
        VALUES ($1, 'income', $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.amount_cents)
    .bind(req.member_id)
    .bind(format!("Payment - {}", receipt))
    .bind(&receipt)
    .execute(&mut *tx)
    .await?;

    if let Some(invoice_id) = req.invoice_id {
        close_invoice_if_settled(&mut tx, invoice_id).await?;
    }

    tx.commit().await?;

    let payment = fetch_payment(&state, payment_id).await?;

    tracing::info!(
        payment_id = %payment_id,
        amount_cents = req.amount_cents,
        method = ?req.method,
        "Payment completed"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            payment,
            client_secret: None,
        }),
    ))
}

/// Get a payment by ID
pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Json<PaymentResponse>> {
    let payment = fetch_payment(&state, payment_id).await?;
    Ok(Json(payment))
}

/// Refund a completed payment.
///
/// Card payments are refunded at the gateway first; the local row only moves
/// to refunded once Stripe accepts the refund. A refund transaction is written
/// to the ledger either way.
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Json<PaymentResponse>> {
    #[derive(FromRow)]
    struct RefundablePayment {
        member_id: Uuid,
        amount_cents: i64,
        method: PaymentMethod,
        status: PaymentStatus,
        receipt_number: String,
        stripe_payment_intent_id: Option<String>,
    }

    let row: Option<RefundablePayment> = sqlx::query_as(
        r#"
        SELECT member_id, amount_cents, method, status, receipt_number,
               stripe_payment_intent_id
        FROM payments
        WHERE id = $1
        "#,
    )
    .bind(payment_id)
    .fetch_optional(&state.pool)
    .await?;
    let payment = row.ok_or(ApiError::NotFound)?;

    if payment.status == PaymentStatus::Refunded {
        return Err(ApiError::Conflict("Payment already refunded".to_string()));
    }
    if payment.status != PaymentStatus::Completed {
        return Err(ApiError::Conflict(
            "Only completed payments can be refunded".to_string(),
        ));
    }

    if payment.method.settles_via_gateway() {
        let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;
        let intent_id = payment
            .stripe_payment_intent_id
            .as_deref()
            .ok_or_else(|| {
                ApiError::Conflict("Card payment has no gateway transaction".to_string())
            })?;

        let refund_id = billing.refunds.refund_payment_intent(intent_id).await?;
        tracing::info!(payment_id = %payment_id, refund_id = %refund_id, "Gateway refund issued");
    }

    let mut tx = state.pool.begin().await?;

    // Guard against a concurrent refund between the read and this update
    let updated = sqlx::query(
        "UPDATE payments SET status = 'refunded', updated_at = NOW() WHERE id = $1 AND status = 'completed'",
    )
    .bind(payment_id)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::Conflict("Payment already refunded".to_string()));
    }

    sqlx::query(
        r#"
        INSERT INTO transactions (id, type, amount_cents, member_id, description, reference)
        VALUES ($1, 'refund', $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payment.amount_cents)
    .bind(payment.member_id)
    .bind(format!("Refund for payment {}", payment.receipt_number))
    .bind(&payment.receipt_number)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        payment_id = %payment_id,
        amount_cents = payment.amount_cents,
        "Payment refunded"
    );

    let payment = fetch_payment(&state, payment_id).await?;
    Ok(Json(payment))
}

// =============================================================================
// Internal Helpers
// =============================================================================

async fn fetch_payment(state: &AppState, payment_id: Uuid) -> ApiResult<PaymentResponse> {
    let payment: PaymentResponse = sqlx::query_as(&format!(
        "SELECT {PAYMENT_COLUMNS} {PAYMENT_JOINS} WHERE p.id = $1"
    ))
    .bind(payment_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;
    Ok(payment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_numbers_carry_prefix_and_are_monotonic() {
        let a = new_receipt_number();
        let b = new_receipt_number();
        assert!(a.starts_with("RCP"));
        assert!(b.starts_with("RCP"));
        assert!(b[3..].parse::<i64>().unwrap() >= a[3..].parse::<i64>().unwrap());
    }
}
