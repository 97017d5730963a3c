//! Fixed-window limiter: one permitted request per session per window.
//!
//! The window is anchored to the last *permitted* request. A rejected request
//! leaves the stored timestamp alone, so hammering the route does not push
//! the next admission further out.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::{db::DbPool, error::AppError, models::access::AccessRecord, services::sessions::short};

#[derive(Clone)]
pub struct RateLimiter {
    db: DbPool,
    window: Duration,
}

impl RateLimiter {
    pub fn new(db: DbPool, window: Duration) -> Self {
        Self { db, window }
    }

    /// Admits or rejects a request made by `session_id` at `now`.
    pub async fn check(&self, session_id: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        let inserted = sqlx::query(
            "INSERT INTO access (session_id, last_permitted_at) VALUES (?1, ?2) ON CONFLICT (session_id) DO NOTHING",
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.db)
        .await?
        .rows_affected();
        if inserted == 1 {
            debug!(session = %short(session_id), "first rate-limited request admitted");
            return Ok(());
        }

        let Some(record) = self.record(session_id).await? else {
            // Forgotten between the insert and the read; treat as a first visit.
            return Ok(());
        };

        if now - record.last_permitted_at <= self.window {
            debug!(session = %short(session_id), "rate limit hit");
            return Err(AppError::RateLimited);
        }

        sqlx::query(
            "UPDATE access SET last_permitted_at = ?2 WHERE session_id = ?1 AND last_permitted_at < ?2",
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn record(&self, session_id: &str) -> Result<Option<AccessRecord>, AppError> {
        let record = sqlx::query_as::<_, AccessRecord>(
            "SELECT session_id, last_permitted_at FROM access WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    pub async fn forget(&self, session_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM access WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Drops records whose last admission predates `cutoff`.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM access WHERE last_permitted_at < ?1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
