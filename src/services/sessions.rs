use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use tracing::debug;
use uuid::Uuid;

use crate::{
    clock::Clock,
    db::DbPool,
    error::AppError,
    models::session::{SessionData, SessionRecord},
};

/// Server-side session records, keyed by an opaque random identifier.
#[derive(Clone)]
pub struct SessionStore {
    db: DbPool,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(db: DbPool, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { db, ttl, clock }
    }

    /// `Ok(None)` means the id is unknown or its record has expired; store
    /// failures are reported as errors and never collapse into `None`.
    pub async fn load(&self, id: &str) -> Result<Option<SessionRecord>, AppError> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, data, created_at, last_modified, expires_at FROM sessions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match record {
            Some(record) if record.is_expired(self.clock.now()) => {
                debug!(session = %short(id), "dropping expired session");
                self.destroy(id).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub async fn create(&self) -> Result<SessionRecord, AppError> {
        let now = self.clock.now();
        let record = SessionRecord {
            id: generate_session_id(),
            data: Json(SessionData::default()),
            created_at: now,
            last_modified: now,
            expires_at: now + self.ttl,
        };

        sqlx::query(
            "INSERT INTO sessions (id, data, created_at, last_modified, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&record.id)
        .bind(&record.data)
        .bind(record.created_at)
        .bind(record.last_modified)
        .bind(record.expires_at)
        .execute(&self.db)
        .await?;

        debug!(session = %short(&record.id), "created session");
        Ok(record)
    }

    /// Persists the record's data and rolls its expiry forward.
    pub async fn save(&self, record: &mut SessionRecord) -> Result<(), AppError> {
        let now = self.clock.now();
        record.last_modified = now;
        record.expires_at = now + self.ttl;

        sqlx::query(
            r#"INSERT INTO sessions (id, data, created_at, last_modified, expires_at)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT (id) DO UPDATE SET
                   data = excluded.data,
                   last_modified = excluded.last_modified,
                   expires_at = excluded.expires_at"#,
        )
        .bind(&record.id)
        .bind(&record.data)
        .bind(record.created_at)
        .bind(record.last_modified)
        .bind(record.expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Rolls the expiry of an untouched session forward without rewriting its data.
    pub async fn touch(&self, id: &str) -> Result<(), AppError> {
        let now = self.clock.now();
        sqlx::query("UPDATE sessions SET last_modified = ?2, expires_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(now)
            .bind(now + self.ttl)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn destroy(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn generate_session_id() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Enough of an id to correlate log lines without writing the secret out.
pub(crate) fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
