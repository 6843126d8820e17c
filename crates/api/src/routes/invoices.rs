//! Invoice routes
//!
//! Invoices are itemized: the subtotal is derived from line items, and
//! `total = subtotal - discount + tax`. Invoices close automatically once
//! completed payments cover the total; cancellation is only allowed while
//! unpaid.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use gymtrack_shared::{next_invoice_number, InvoiceStatus, Pagination};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub member_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub member_id: Uuid,
    pub items: Vec<InvoiceItemRequest>,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub tax_cents: i64,
    pub due_date: Option<Date>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceItemRequest {
    pub description: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<InvoiceResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: InvoiceRow,
    pub items: Vec<InvoiceItemRow>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub invoice_number: String,
    pub member_id: Uuid,
    pub member_name: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub status: InvoiceStatus,
    pub due_date: Option<Date>,
    pub notes: Option<String>,
    pub paid_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize, FromRow)]
pub struct InvoiceItemRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

const INVOICE_COLUMNS: &str = "i.id, i.invoice_number, i.member_id, \
     m.full_name AS member_name, i.subtotal_cents, i.discount_cents, i.tax_cents, \
     i.total_cents, i.status, i.due_date, i.notes, i.paid_at, i.created_at";

const INVOICE_JOINS: &str = "FROM invoices i JOIN members m ON m.id = i.member_id";

const ITEM_COLUMNS: &str =
    "id, invoice_id, description, quantity, unit_price_cents, total_cents";

// =============================================================================
// Amount Calculation
// =============================================================================

/// Invoice totals derived from line items
pub(crate) fn invoice_totals(
    items: &[InvoiceItemRequest],
    discount_cents: i64,
    tax_cents: i64,
) -> (i64, i64) {
    let subtotal: i64 = items
        .iter()
        .map(|item| i64::from(item.quantity) * item.unit_price_cents)
        .sum();
    let total = (subtotal - discount_cents + tax_cents).max(0);
    (subtotal, total)
}

// =============================================================================
// Handlers
// =============================================================================

/// List invoices with their line items
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
) -> ApiResult<Json<InvoiceListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
        r#"
        SELECT {INVOICE_COLUMNS}
        {INVOICE_JOINS}
        WHERE ($1::UUID IS NULL OR i.member_id = $1)
          AND ($2::VARCHAR IS NULL OR i.status = $2)
        ORDER BY i.created_at DESC
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
        FROM invoices i
        WHERE ($1::UUID IS NULL OR i.member_id = $1)
          AND ($2::VARCHAR IS NULL OR i.status = $2)
        "#,
    )
    .bind(query.member_id)
    .bind(query.status)
    .fetch_one(&state.pool)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let items: Vec<InvoiceItemRow> = sqlx::query_as(&format!(
        "SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = ANY($1) ORDER BY description"
    ))
    .bind(&ids)
    .fetch_all(&state.pool)
    .await?;

    let invoices = rows
        .into_iter()
        .map(|invoice| {
            let invoice_items = items
                .iter()
                .filter(|item| item.invoice_id == invoice.id)
                .map(|item| InvoiceItemRow {
                    id: item.id,
                    invoice_id: item.invoice_id,
                    description: item.description.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                    total_cents: item.total_cents,
                })
                .collect();
            InvoiceResponse {
                invoice,
                items: invoice_items,
            }
        })
        .collect();

    Ok(Json(InvoiceListResponse {
        invoices,
        pagination: Pagination::new(total, page, limit),
    }))
}

/// Create an invoice from line items
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(req): Json<CreateInvoiceRequest>,
) -> ApiResult<(StatusCode, Json<InvoiceResponse>)> {
    if req.items.is_empty() {
        return Err(ApiError::Validation(
            "Invoice needs at least one line item".to_string(),
        ));
    }
    for item in &req.items {
        if item.description.trim().is_empty() {
            return Err(ApiError::Validation(
                "Line item description is required".to_string(),
            ));
        }
        if item.quantity <= 0 {
            return Err(ApiError::Validation(
                "Line item quantity must be positive".to_string(),
            ));
        }
        if item.unit_price_cents < 0 {
            return Err(ApiError::Validation(
                "Line item price cannot be negative".to_string(),
            ));
        }
    }
    if req.discount_cents < 0 || req.tax_cents < 0 {
        return Err(ApiError::Validation(
            "Discount and tax cannot be negative".to_string(),
        ));
    }

    let mut tx = state.pool.begin().await?;

    let member: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM members WHERE id = $1")
        .bind(req.member_id)
        .fetch_optional(&mut *tx)
        .await?;
    if member.is_none() {
        return Err(ApiError::BadRequest("Member not found".to_string()));
    }

    let last: Option<(String,)> = sqlx::query_as(
        "SELECT invoice_number FROM invoices ORDER BY LENGTH(invoice_number) DESC, invoice_number DESC LIMIT 1",
    )
    .fetch_optional(&mut *tx)
    .await?;
    let invoice_number = next_invoice_number(last.as_ref().map(|(n,)| n.as_str()));

    let (subtotal_cents, total_cents) =
        invoice_totals(&req.items, req.discount_cents, req.tax_cents);

    let invoice_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO invoices (id, invoice_number, member_id, subtotal_cents, discount_cents,
                              tax_cents, total_cents, status, due_date, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9)
        "#,
    )
    .bind(invoice_id)
    .bind(&invoice_number)
    .bind(req.member_id)
    .bind(subtotal_cents)
    .bind(req.discount_cents)
    .bind(req.tax_cents)
    .bind(total_cents)
    .bind(req.due_date)
    .bind(&req.notes)
    .execute(&mut *tx)
    .await?;

    for item in &req.items {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (id, invoice_id, description, quantity,
                                       unit_price_cents, total_cents)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(item.description.trim())
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(i64::from(item.quantity) * item.unit_price_cents)
        .execute(&mut *tx)
        .await?;
    }

    let invoice = fetch_invoice(&mut tx, invoice_id).await?;
    tx.commit().await?;

    tracing::info!(
        invoice_id = %invoice_id,
        invoice_number = %invoice_number,
        total_cents,
        "Invoice created"
    );

    Ok((StatusCode::CREATED, Json(invoice)))
}

/// Get an invoice with its line items
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<InvoiceResponse>> {
    let mut tx = state.pool.begin().await?;
    let invoice = fetch_invoice(&mut tx, invoice_id).await?;
    tx.commit().await?;
    Ok(Json(invoice))
}

/// Cancel an unpaid invoice
pub async fn cancel_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<InvoiceResponse>> {
    let mut tx = state.pool.begin().await?;

    let row: Option<(InvoiceStatus,)> =
        sqlx::query_as("SELECT status FROM invoices WHERE id = $1 FOR UPDATE")
            .bind(invoice_id)
            .fetch_optional(&mut *tx)
            .await?;
    let (status,) = row.ok_or(ApiError::NotFound)?;

    if status == InvoiceStatus::Paid {
        return Err(ApiError::Conflict(
            "Paid invoices cannot be cancelled".to_string(),
        ));
    }
    if status == InvoiceStatus::Cancelled {
        return Err(ApiError::Conflict("Invoice already cancelled".to_string()));
    }

    sqlx::query("UPDATE invoices SET status = 'cancelled', updated_at = NOW() WHERE id = $1")
        .bind(invoice_id)
        .execute(&mut *tx)
        .await?;

    let invoice = fetch_invoice(&mut tx, invoice_id).await?;
    tx.commit().await?;

    tracing::info!(invoice_id = %invoice_id, "Invoice cancelled");

    Ok(Json(invoice))
}

// =============================================================================
// Internal Helpers
// =============================================================================

async fn fetch_invoice(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    invoice_id: Uuid,
) -> ApiResult<InvoiceResponse> {
    let invoice: InvoiceRow = sqlx::query_as(&format!(
        "SELECT {INVOICE_COLUMNS} {INVOICE_JOINS} WHERE i.id = $1"
    ))
    .bind(invoice_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(ApiError::NotFound)?;

    let items: Vec<InvoiceItemRow> = sqlx::query_as(&format!(
        "SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = $1 ORDER BY description"
    ))
    .bind(invoice_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(InvoiceResponse { invoice, items })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i32, unit_price_cents: i64) -> InvoiceItemRequest {
        InvoiceItemRequest {
            description: "Line".to_string(),
            quantity,
            unit_price_cents,
        }
    }

    #[test]
    fn totals_sum_line_items() {
        let (subtotal, total) = invoice_totals(&[item(2, 1_500), item(1, 5_000)], 0, 0);
        assert_eq!(subtotal, 8_000);
        assert_eq!(total, 8_000);
    }

    #[test]
    fn totals_apply_discount_and_tax() {
        let (subtotal, total) = invoice_totals(&[item(1, 10_000)], 1_000, 450);
        assert_eq!(subtotal, 10_000);
        assert_eq!(total, 9_450);
    }

    #[test]
    fn total_never_negative() {
        let (_, total) = invoice_totals(&[item(1, 500)], 2_000, 0);
        assert_eq!(total, 0);
    }
}
