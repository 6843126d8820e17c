//! GymTrack background worker
//!
//! Runs the scheduled maintenance jobs: subscription expiry and auto-unfreeze,
//! overdue invoice marking, lapsed member deactivation, and overnight
//! attendance cleanup. Every job is idempotent, so a second worker instance
//! or a restart mid-run is safe.

mod jobs;

use std::time::Duration;

use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Days a member may sit without a live subscription before deactivation
const MEMBER_GRACE_DAYS: i32 = 90;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = gymtrack_shared::create_pool(&database_url, 3).await?;

    // Run the daily jobs once at startup so a worker that was down over
    // midnight still catches up immediately.
    run_daily_jobs(&pool).await;

    let scheduler = JobScheduler::new().await?;

    // Daily maintenance shortly after midnight UTC
    let daily_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 5 0 * * *", move |_uuid, _lock| {
            let pool = daily_pool.clone();
            Box::pin(async move {
                run_daily_jobs(&pool).await;
            })
        })?)
        .await?;

    // Attendance records left open are closed in the early morning
    let attendance_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _lock| {
            let pool = attendance_pool.clone();
            Box::pin(async move {
                jobs::close_stale_attendance(&pool).await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("GymTrack worker started");

    // The scheduler runs on background tasks; keep the process alive.
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

async fn run_daily_jobs(pool: &PgPool) {
    jobs::expire_subscriptions(pool).await;
    jobs::unfreeze_elapsed_subscriptions(pool).await;
    jobs::mark_overdue_invoices(pool).await;
    jobs::deactivate_lapsed_members(pool, MEMBER_GRACE_DAYS).await;
}
