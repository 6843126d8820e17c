//! Financial ledger routes

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use gymtrack_shared::{Pagination, TransactionType};

use crate::{error::ApiResult, state::AppState};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    pub from: Option<Date>,
    pub to: Option<Date>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionResponse>,
    pub summary: TransactionSummary,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TransactionResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount_cents: i64,
    pub member_id: Option<Uuid>,
    pub description: String,
    pub reference: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Sums over the filtered window, not just the current page
#[derive(Debug, Serialize, FromRow)]
pub struct TransactionSummary {
    pub income_cents: i64,
    pub expense_cents: i64,
    pub refund_cents: i64,
    pub net_cents: i64,
}

// =============================================================================
// Handlers
// =============================================================================

/// List ledger entries with type and date-range filters, plus window totals
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
) -> ApiResult<Json<TransactionListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let transactions: Vec<TransactionResponse> = sqlx::query_as(
        r#"
        SELECT id, type, amount_cents, member_id, description, reference, created_at
        FROM transactions
        WHERE ($1::VARCHAR IS NULL OR type = $1)
          AND ($2::DATE IS NULL OR created_at >= $2)
          AND ($3::DATE IS NULL OR created_at < $3 + 1)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(query.transaction_type)
    .bind(query.from)
    .bind(query.to)
    .bind(limit)
    .bind((page - 1) * limit)
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM transactions
        WHERE ($1::VARCHAR IS NULL OR type = $1)
          AND ($2::DATE IS NULL OR created_at >= $2)
          AND ($3::DATE IS NULL OR created_at < $3 + 1)
        "#,
    )
    .bind(query.transaction_type)
    .bind(query.from)
    .bind(query.to)
    .fetch_one(&state.pool)
    .await?;

    let summary: TransactionSummary = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(amount_cents) FILTER (WHERE type = 'income'), 0)::BIGINT AS income_cents,
               COALESCE(SUM(amount_cents) FILTER (WHERE type = 'expense'), 0)::BIGINT AS expense_cents,
               COALESCE(SUM(amount_cents) FILTER (WHERE type = 'refund'), 0)::BIGINT AS refund_cents,
               (COALESCE(SUM(amount_cents) FILTER (WHERE type = 'income'), 0)
                 - COALESCE(SUM(amount_cents) FILTER (WHERE type = 'expense'), 0)
                 - COALESCE(SUM(amount_cents) FILTER (WHERE type = 'refund'), 0))::BIGINT AS net_cents
        FROM transactions
        WHERE ($1::VARCHAR IS NULL OR type = $1)
          AND ($2::DATE IS NULL OR created_at >= $2)
          AND ($3::DATE IS NULL OR created_at < $3 + 1)
        "#,
    )
    .bind(query.transaction_type)
    .bind(query.from)
    .bind(query.to)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(TransactionListResponse {
        transactions,
        summary,
        pagination: Pagination::new(total, page, limit),
    }))
}
