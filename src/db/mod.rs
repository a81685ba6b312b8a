//! Database connection management.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

/// PostgreSQL connection pool shared by every repository in the process.
///
/// Long-running work never holds a checked-out connection across an HTTP
/// call: the pool is only acquired inside a transactional block (see
/// `repository::order_repository`), matching SPEC_FULL.md §5.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.connection_url())
            .await?;

        tracing::info!(pool_size = config.pool_size, "PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Wrap an already-constructed pool, e.g. one built by a test harness
    /// against a throwaway schema.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DatabaseConfig {
        DatabaseConfig {
            host: "localhost".into(),
            port: 5432,
            name: "shopee_ingest_test".into(),
            user: "postgres".into(),
            password: "postgres".into(),
            schema: "public".into(),
            pool_size: 5,
        }
    }

    #[tokio::test]
    #[ignore] // requires a running PostgreSQL instance
    async fn connect_and_health_check() {
        let db = Database::connect(&test_config())
            .await
            .expect("failed to connect");
        db.health_check().await.expect("health check should pass");
    }

    #[tokio::test]
    #[ignore]
    async fn connect_fails_with_bad_host() {
        let mut config = test_config();
        config.host = "no-such-host.invalid".into();
        let result = Database::connect(&config).await;
        assert!(result.is_err());
    }
}
