//! PostgreSQL pool and schema management.

use crate::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!(
        max_connections = config.max_connections,
        "Connecting to PostgreSQL"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.url)
        .await?;

    tracing::info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Apply the embedded migrations under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database schema is up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // needs a running PostgreSQL at DATABASE_URL
    async fn test_pool_and_migrations() {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/org_auth_test".to_string());
        let pool = create_pool(&DatabaseConfig {
            url,
            max_connections: 2,
            min_connections: 1,
        })
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
    }
}
