//! # Database Persistence Layer
//!
//! Postgres write-through for the ledger via SQLx.
//!
//! The database is **optional**. When `DATABASE_URL` is set, it is the only
//! copy of the records: each unit of work reads its snapshot from the tables
//! and commits its change set in one SQL transaction. No rows are cached in
//! the process between requests. When absent, the engine runs in memory only
//! (development and tests).
//!
//! Subscription updates carry the version they were read at
//! (`WHERE id = $1 AND version = $2`); a second instance that wrote the row
//! first makes the update touch zero rows, which surfaces as
//! [`LifecycleError::ConcurrentModification`](crate::LifecycleError).

mod journal;
mod rows;

pub use journal::PgJournal;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; running in-memory only. State will not survive restarts.");
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;
    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(Some(pool))
}
