//! CSV export routes
//!
//! Exports stream the full table as `text/csv` with an attachment disposition.
//! Monetary fields are exported in cents to keep the values exact.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

use gymtrack_shared::{MemberStatus, PaymentMethod, PaymentStatus};

use crate::{error::ApiResult, state::AppState};

// =============================================================================
// CSV Encoding
// =============================================================================

/// Quote a field when it contains a delimiter, quote, or newline (RFC 4180)
pub(crate) fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

fn csv_headers(filename: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    headers
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(FromRow)]
struct MemberExportRow {
    member_number: String,
    full_name: String,
    phone: String,
    email: Option<String>,
    status: MemberStatus,
    joined_at: OffsetDateTime,
}

/// Export the member registry as CSV
pub async fn export_members(State(state): State<AppState>) -> ApiResult<(HeaderMap, String)> {
    let rows: Vec<MemberExportRow> = sqlx::query_as(
        r#"
        SELECT member_number, full_name, phone, email, status, joined_at
        FROM members
        ORDER BY member_number
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let mut csv = String::from("member_number,full_name,phone,email,status,joined_at\n");
    for row in rows {
        csv.push_str(&csv_row(&[
            &row.member_number,
            &row.full_name,
            &row.phone,
            row.email.as_deref().unwrap_or(""),
            member_status_name(&row.status),
            &row.joined_at.date().to_string(),
        ]));
        csv.push('\n');
    }

    Ok((csv_headers("members.csv"), csv))
}

#[derive(FromRow)]
struct PaymentExportRow {
    receipt_number: String,
    member_number: String,
    member_name: String,
    amount_cents: i64,
    method: PaymentMethod,
    status: PaymentStatus,
    paid_at: Option<OffsetDateTime>,
    created_date: Date,
}

/// Export the payment ledger as CSV
pub async fn export_payments(State(state): State<AppState>) -> ApiResult<(HeaderMap, String)> {
    let rows: Vec<PaymentExportRow> = sqlx::query_as(
        r#"
        SELECT p.receipt_number, m.member_number, m.full_name AS member_name,
               p.amount_cents, p.method, p.status, p.paid_at,
               p.created_at::DATE AS created_date
        FROM payments p
        JOIN members m ON m.id = p.member_id
        ORDER BY p.created_at DESC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let mut csv = String::from(
        "receipt_number,member_number,member_name,amount_cents,method,status,paid_at,created\n",
    );
    for row in rows {
        csv.push_str(&csv_row(&[
            &row.receipt_number,
            &row.member_number,
            &row.member_name,
            &row.amount_cents.to_string(),
            method_name(&row.method),
            status_name(&row.status),
            &row.paid_at.map(|t| t.date().to_string()).unwrap_or_default(),
            &row.created_date.to_string(),
        ]));
        csv.push('\n');
    }

    Ok((csv_headers("payments.csv"), csv))
}

// =============================================================================
// Internal Helpers
// =============================================================================

fn member_status_name(status: &MemberStatus) -> &'static str {
    match status {
        MemberStatus::Active => "active",
        MemberStatus::Inactive => "inactive",
        MemberStatus::Suspended => "suspended",
    }
}

fn method_name(method: &PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cash => "cash",
        PaymentMethod::Card => "card",
        PaymentMethod::BankTransfer => "bank_transfer",
    }
}

fn status_name(status: &PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "pending",
        PaymentStatus::Completed => "completed",
        PaymentStatus::Failed => "failed",
        PaymentStatus::Refunded => "refunded",
        PaymentStatus::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_pass_through() {
        assert_eq!(csv_field("M1001"), "M1001");
        assert_eq!(csv_field("Jane Doe"), "Jane Doe");
    }

    #[test]
    fn fields_with_delimiters_are_quoted() {
        assert_eq!(csv_field("Doe, Jane"), "\"Doe, Jane\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(csv_field("the \"big\" gym"), "\"the \"\"big\"\" gym\"");
    }

    #[test]
    fn rows_join_with_commas() {
        assert_eq!(csv_row(&["a", "b,c", "d"]), "a,\"b,c\",d");
    }
}
