//! Record stores for Ferry CI.
//!
//! Provides the in-memory store used for development and tests, and the
//! PostgreSQL store used in production.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}
