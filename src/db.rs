use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::AppError;

pub type DbPool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<DbPool, AppError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn migrate(db: &DbPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(db).await?;
    info!("database migrations applied");
    Ok(())
}

/// Single-connection in-memory database with the schema applied.
/// The connection is never recycled, otherwise the data would vanish with it.
pub async fn memory_pool() -> Result<DbPool, AppError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}
