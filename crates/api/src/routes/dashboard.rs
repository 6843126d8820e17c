//! Dashboard aggregation routes
//!
//! Read-only summaries over the operational tables. Revenue is always the sum
//! of completed payments; pending and refunded rows never count.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::Date;

use crate::{error::ApiResult, state::AppState};

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize, FromRow)]
pub struct DashboardStats {
    pub total_members: i64,
    pub active_members: i64,
    pub today_attendance: i64,
    pub expiring_today: i64,
    /// Completed payments in the current calendar month
    pub monthly_revenue_cents: i64,
    /// Active members with no active subscription
    pub members_without_subscription: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct DailyAttendance {
    pub date: Date,
    pub visits: i64,
}

#[derive(Debug, Deserialize)]
pub struct RevenueQuery {
    /// How many months back to include (default 6)
    pub months: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyRevenue {
    pub year: i32,
    pub month: u8,
    pub revenue_cents: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PackageSubscriptions {
    pub package_name: String,
    pub active_subscriptions: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MonthlyGrowth {
    pub year: i32,
    pub month: i32,
    pub new_members: i64,
}

// =============================================================================
// Aggregation
// =============================================================================

/// Bucket dated amounts into per-month revenue, oldest month first.
/// Input order does not matter; months with no payments are omitted.
pub(crate) fn bucket_monthly(rows: &[(Date, i64)]) -> Vec<MonthlyRevenue> {
    let mut buckets: Vec<MonthlyRevenue> = Vec::new();
    for (date, amount_cents) in rows {
        let year = date.year();
        let month = u8::from(date.month());
        match buckets
            .iter_mut()
            .find(|b| b.year == year && b.month == month)
        {
            Some(bucket) => bucket.revenue_cents += amount_cents,
            None => buckets.push(MonthlyRevenue {
                year,
                month,
                revenue_cents: *amount_cents,
            }),
        }
    }
    buckets.sort_by_key(|b| (b.year, b.month));
    buckets
}

// =============================================================================
// Handlers
// =============================================================================

/// Headline numbers for the dashboard
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<DashboardStats>> {
    let stats: DashboardStats = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM members) AS total_members,
            (SELECT COUNT(*) FROM members WHERE status = 'active') AS active_members,
            (SELECT COUNT(*) FROM attendance WHERE date = CURRENT_DATE) AS today_attendance,
            (SELECT COUNT(*) FROM subscriptions
             WHERE status = 'active' AND end_date = CURRENT_DATE) AS expiring_today,
            (SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM payments
             WHERE status = 'completed'
               AND paid_at >= DATE_TRUNC('month', NOW())) AS monthly_revenue_cents,
            (SELECT COUNT(*) FROM members m
             WHERE m.status = 'active'
               AND NOT EXISTS (
                   SELECT 1 FROM subscriptions s
                   WHERE s.member_id = m.id AND s.status = 'active'
               )) AS members_without_subscription
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(stats))
}

/// Visits per day over the last 7 days, including zero days
pub async fn attendance_series(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DailyAttendance>>> {
    let series: Vec<DailyAttendance> = sqlx::query_as(
        r#"
        SELECT d.date::DATE AS date, COUNT(a.id) AS visits
        FROM GENERATE_SERIES(CURRENT_DATE - 6, CURRENT_DATE, '1 day'::INTERVAL) d(date)
        LEFT JOIN attendance a ON a.date = d.date::DATE
        GROUP BY d.date
        ORDER BY d.date
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(series))
}

/// Completed-payment revenue bucketed by calendar month
pub async fn revenue_series(
    State(state): State<AppState>,
    Query(query): Query<RevenueQuery>,
) -> ApiResult<Json<Vec<MonthlyRevenue>>> {
    let months = query.months.unwrap_or(6).clamp(1, 36);

    let rows: Vec<(Date, i64)> = sqlx::query_as(
        r#"
        SELECT paid_at::DATE, amount_cents
        FROM payments
        WHERE status = 'completed'
          AND paid_at >= DATE_TRUNC('month', NOW()) - ($1 - 1) * '1 month'::INTERVAL
        "#,
    )
    .bind(months)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(bucket_monthly(&rows)))
}

/// Active subscription counts per package
pub async fn subscriptions_by_package(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PackageSubscriptions>>> {
    let breakdown: Vec<PackageSubscriptions> = sqlx::query_as(
        r#"
        SELECT p.name AS package_name, COUNT(s.id) AS active_subscriptions
        FROM packages p
        LEFT JOIN subscriptions s ON s.package_id = p.id AND s.status = 'active'
        GROUP BY p.id, p.name
        ORDER BY active_subscriptions DESC, p.name
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(breakdown))
}

/// New member registrations per month over the last year
pub async fn member_growth(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<MonthlyGrowth>>> {
    let growth: Vec<MonthlyGrowth> = sqlx::query_as(
        r#"
        SELECT EXTRACT(YEAR FROM joined_at)::INT AS year,
               EXTRACT(MONTH FROM joined_at)::INT AS month,
               COUNT(*) AS new_members
        FROM members
        WHERE joined_at >= DATE_TRUNC('month', NOW()) - '11 months'::INTERVAL
        GROUP BY 1, 2
        ORDER BY 1, 2
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(growth))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn payments_in_same_month_sum() {
        let buckets = bucket_monthly(&[
            (date!(2025 - 03 - 05), 100),
            (date!(2025 - 03 - 28), 250),
        ]);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].revenue_cents, 350);
        assert_eq!((buckets[0].year, buckets[0].month), (2025, 3));
    }

    #[test]
    fn months_bucket_separately_and_sort() {
        let buckets = bucket_monthly(&[
            (date!(2025 - 04 - 01), 500),
            (date!(2025 - 02 - 14), 200),
            (date!(2025 - 04 - 30), 100),
        ]);
        assert_eq!(buckets.len(), 2);
        assert_eq!((buckets[0].year, buckets[0].month, buckets[0].revenue_cents), (2025, 2, 200));
        assert_eq!((buckets[1].year, buckets[1].month, buckets[1].revenue_cents), (2025, 4, 600));
    }

    #[test]
    fn year_boundary_keeps_months_apart() {
        let buckets = bucket_monthly(&[
            (date!(2025 - 12 - 31), 1_000),
            (date!(2026 - 01 - 01), 2_000),
        ]);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].year, 2025);
        assert_eq!(buckets[1].year, 2026);
    }

    #[test]
    fn empty_input_yields_no_buckets() {
        assert!(bucket_monthly(&[]).is_empty());
    }
}
