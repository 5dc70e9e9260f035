//! Standalone migration runner: applies the Job Store's schema against
//! `POSTGRES_URL` and exits. Run before the first `scheduler-server`
//! start in a fresh environment.

use scheduler_core::config::StoreConfig;
use scheduler_store::Migrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let url = std::env::var("POSTGRES_URL")
        .map_err(|_| anyhow::anyhow!("POSTGRES_URL must be set to run migrations"))?;

    let config = StoreConfig {
        url,
        ..StoreConfig::default()
    };
    let pool = scheduler_store::pool::connect(&config).await?;

    tracing::info!("running migrations");
    Migrator::new().run(&pool).await?;
    tracing::info!("migrations complete");

    Ok(())
}
