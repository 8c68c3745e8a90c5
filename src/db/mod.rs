pub(crate) mod models;
pub(crate) mod types;

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};

use crate::core::config::Settings;

pub(crate) async fn init_pool(settings: &Settings) -> Result<PgPool, sqlx::Error> {
    let database = settings.database();
    let options = database
        .database_url()
        .parse::<PgConnectOptions>()?
        .application_name("quiz-attempts")
        .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_millis(500))
        .log_statements(tracing::log::LevelFilter::Off);

    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .acquire_timeout(Duration::from_secs(database.acquire_timeout_secs))
        .connect_with(options)
        .await?;

    tracing::info!(max_connections = database.max_connections, "Database pool ready");
    Ok(pool)
}

/// Applies the embedded schema migrations; safe to call on every start.
pub(crate) async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    let migrator = sqlx::migrate!("./migrations");
    migrator.run(pool).await?;
    tracing::debug!(applied = migrator.iter().count(), "Schema migrations checked");
    Ok(())
}
