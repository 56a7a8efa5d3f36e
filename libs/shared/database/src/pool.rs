use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use shared_config::AppConfig;
use shared_models::AppError;

/// Thin wrapper over the connection pool every cell shares. Cells never
/// construct their own pool; they take an `&Database` (or clone the inner
/// `PgPool`) from `AppState`.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(&config.database_url)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Starts a transaction. Callers commit or roll back explicitly; an
    /// unhandled drop rolls back, matching Postgres' own connection-drop
    /// behavior.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'_, sqlx::Postgres>, AppError> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
