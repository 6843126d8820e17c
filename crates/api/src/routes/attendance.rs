//! Attendance tracking routes
//!
//! One attendance row per member per day. Check-in creates the row; a second
//! check-in on the same day is rejected. Check-out stamps the open row.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AttendanceQuery {
    /// How many days of history to return (default 30)
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RecordAttendanceRequest {
    CheckIn,
    CheckOut,
}

#[derive(Debug, Serialize, FromRow)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub date: Date,
    pub check_in: OffsetDateTime,
    pub check_out: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct AttendanceHistoryResponse {
    pub records: Vec<AttendanceRecord>,
    pub total_visits: i64,
}

const ATTENDANCE_COLUMNS: &str = "id, member_id, date, check_in, check_out";

// =============================================================================
// Handlers
// =============================================================================

/// Attendance history for a member over the last N days
pub async fn member_attendance(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Query(query): Query<AttendanceQuery>,
) -> ApiResult<Json<AttendanceHistoryResponse>> {
    let days = query.days.unwrap_or(30).clamp(1, 365);

    let member: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM members WHERE id = $1")
        .bind(member_id)
        .fetch_optional(&state.pool)
        .await?;
    if member.is_none() {
        return Err(ApiError::NotFound);
    }

    let records: Vec<AttendanceRecord> = sqlx::query_as(&format!(
        r#"
        SELECT {ATTENDANCE_COLUMNS}
        FROM attendance
        WHERE member_id = $1 AND date >= CURRENT_DATE - $2::INT
        ORDER BY date DESC
        "#
    ))
    .bind(member_id)
    .bind(days as i32)
    .fetch_all(&state.pool)
    .await?;

    let total_visits = records.len() as i64;

    Ok(Json(AttendanceHistoryResponse {
        records,
        total_visits,
    }))
}

/// Record a check-in or check-out for a member.
///
/// Check-in fails with a conflict when the member already checked in today.
/// Check-out closes today's open record and fails when there is none.
pub async fn record_attendance(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Json(req): Json<RecordAttendanceRequest>,
) -> ApiResult<(StatusCode, Json<AttendanceRecord>)> {
    let member: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM members WHERE id = $1 AND status = 'active'")
            .bind(member_id)
            .fetch_optional(&state.pool)
            .await?;
    if member.is_none() {
        return Err(ApiError::BadRequest("Member not found or not active".to_string()));
    }

    match req {
        RecordAttendanceRequest::CheckIn => {
            let existing: Option<(Uuid,)> = sqlx::query_as(
                "SELECT id FROM attendance WHERE member_id = $1 AND date = CURRENT_DATE",
            )
            .bind(member_id)
            .fetch_optional(&state.pool)
            .await?;
            if existing.is_some() {
                return Err(ApiError::Conflict(
                    "Member already checked in today".to_string(),
                ));
            }

            let record: AttendanceRecord = sqlx::query_as(&format!(
                r#"
                INSERT INTO attendance (id, member_id, date, check_in)
                VALUES ($1, $2, CURRENT_DATE, NOW())
                RETURNING {ATTENDANCE_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(member_id)
            .fetch_one(&state.pool)
            .await?;

            tracing::info!(member_id = %member_id, "Member checked in");

            Ok((StatusCode::CREATED, Json(record)))
        }
        RecordAttendanceRequest::CheckOut => {
            let record: Option<AttendanceRecord> = sqlx::query_as(&format!(
                r#"
                UPDATE attendance
                SET check_out = NOW()
                WHERE member_id = $1 AND date = CURRENT_DATE AND check_out IS NULL
                RETURNING {ATTENDANCE_COLUMNS}
                "#
            ))
            .bind(member_id)
            .fetch_optional(&state.pool)
            .await?;

            let record = record.ok_or_else(|| {
                ApiError::Conflict("No open check-in to close today".to_string())
            })?;

            Ok((StatusCode::OK, Json(record)))
        }
    }
}
