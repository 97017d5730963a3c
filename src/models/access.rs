use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Rate-limit state: when the session was last let through.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AccessRecord {
    pub session_id: String,
    pub last_permitted_at: DateTime<Utc>,
}
