use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{types::Json, FromRow};

use crate::models::user::UserSnapshot;

pub const IS_AUTHENTICATED_KEY: &str = "isAuthenticated";
pub const USER_KEY: &str = "user";

#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub id: String,
    pub data: Json<SessionData>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Free-form session payload. The authentication marker and the user snapshot
/// are only ever written together through [`SessionData::log_in`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(Map<String, Value>);

impl SessionData {
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn user(&self) -> Option<UserSnapshot> {
        self.get::<UserSnapshot>(USER_KEY)
            .filter(|user| !user.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.get::<bool>(IS_AUTHENTICATED_KEY).unwrap_or(false) && self.user().is_some()
    }

    pub fn log_in(&mut self, user: &UserSnapshot) -> Result<(), serde_json::Error> {
        self.insert(USER_KEY, serde_json::to_value(user)?);
        self.insert(IS_AUTHENTICATED_KEY, Value::Bool(true));
        Ok(())
    }
}
