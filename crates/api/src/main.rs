//! GymTrack API server entry point

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gymtrack_api::{routes, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool =
        gymtrack_shared::create_pool(&config.database_url, config.database_max_connections).await?;

    tracing::info!("Running database migrations");
    gymtrack_shared::run_migrations(&pool).await?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, config);
    let router = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "GymTrack API listening");

    axum::serve(listener, router).await?;

    Ok(())
}
