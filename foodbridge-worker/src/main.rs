//! # FoodBridge Worker
//!
//! Periodic sweeper for the FoodBridge database. Runs alongside the API
//! server against the same PostgreSQL database.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/foodbridge SWEEP_INTERVAL_SECS=60 \
//! cargo run -p foodbridge-worker
//! ```

use foodbridge_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use foodbridge_worker::sweeper::{Sweeper, SweeperConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "foodbridge_worker=debug,foodbridge_shared=info".into());
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("FoodBridge Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let db_config = DatabaseConfig::from_env()?;
    let config = SweeperConfig::from_env()?;

    let pool = create_pool(db_config).await?;
    run_migrations(&pool).await?;

    let sweeper = Sweeper::with_config(pool.clone(), config);

    let token = sweeper.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        token.cancel();
    });

    sweeper.run().await;

    close_pool(pool).await;
    Ok(())
}
