//! Scheduled maintenance jobs
//!
//! Each job is idempotent: running it twice in a row changes nothing the
//! second time, so overlapping schedules or restarts are harmless. Jobs log
//! their outcome and never abort the scheduler on error.

use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

/// Expire active subscriptions whose end date has passed
pub async fn expire_subscriptions(pool: &PgPool) {
    let result = sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'expired', updated_at = NOW()
        WHERE status = 'active' AND end_date < CURRENT_DATE
        "#,
    )
    .execute(pool)
    .await;

    match result {
        Ok(rows) => {
            if rows.rows_affected() > 0 {
                info!(expired = rows.rows_affected(), "Expired overdue subscriptions");
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to expire subscriptions");
        }
    }
}

/// Reactivate frozen subscriptions whose freeze window has ended
pub async fn unfreeze_elapsed_subscriptions(pool: &PgPool) {
    let result = sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'active',
            freeze_reason = NULL,
            freeze_start = NULL,
            freeze_end = NULL,
            updated_at = NOW()
        WHERE status = 'frozen' AND freeze_end < CURRENT_DATE
        "#,
    )
    .execute(pool)
    .await;

    match result {
        Ok(rows) => {
            if rows.rows_affected() > 0 {
                info!(
                    unfrozen = rows.rows_affected(),
                    "Reactivated subscriptions past their freeze window"
                );
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to unfreeze subscriptions");
        }
    }
}

/// Mark pending invoices overdue once their due date has passed
pub async fn mark_overdue_invoices(pool: &PgPool) {
    let result = sqlx::query(
        r#"
        UPDATE invoices
        SET status = 'overdue', updated_at = NOW()
        WHERE status = 'pending' AND due_date < CURRENT_DATE
        "#,
    )
    .execute(pool)
    .await;

    match result {
        Ok(rows) => {
            if rows.rows_affected() > 0 {
                info!(overdue = rows.rows_affected(), "Marked overdue invoices");
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to mark overdue invoices");
        }
    }
}

/// Suspend members with nothing but expired or cancelled subscriptions for
/// a long stretch, so the registry reflects who actually trains here
pub async fn deactivate_lapsed_members(pool: &PgPool, grace_days: i32) {
    let result = sqlx::query(
        r#"
        UPDATE members m
        SET status = 'inactive', updated_at = NOW()
        WHERE m.status = 'active'
          AND NOT EXISTS (
              SELECT 1 FROM subscriptions s
              WHERE s.member_id = m.id
                AND (s.status IN ('active', 'frozen')
                     OR s.end_date >= CURRENT_DATE - $1::INT)
          )
          AND EXISTS (SELECT 1 FROM subscriptions s WHERE s.member_id = m.id)
        "#,
    )
    .bind(grace_days)
    .execute(pool)
    .await;

    match result {
        Ok(rows) => {
            if rows.rows_affected() > 0 {
                info!(
                    deactivated = rows.rows_affected(),
                    grace_days = grace_days,
                    "Deactivated lapsed members"
                );
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to deactivate lapsed members");
        }
    }
}

/// Close attendance records left open overnight
pub async fn close_stale_attendance(pool: &PgPool) {
    let stale: Result<Vec<(Uuid,)>, sqlx::Error> = sqlx::query_as(
        r#"
        UPDATE attendance
        SET check_out = date + '23:59:59'::TIME
        WHERE check_out IS NULL AND date < CURRENT_DATE
        RETURNING id
        "#,
    )
    .fetch_all(pool)
    .await;

    match stale {
        Ok(rows) => {
            if !rows.is_empty() {
                info!(closed = rows.len(), "Closed attendance records left open overnight");
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to close stale attendance records");
        }
    }
}
