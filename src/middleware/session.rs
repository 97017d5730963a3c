//! Session middleware: resolves the `token` cookie to a session record before
//! the handler runs and persists whatever the handler did to it afterwards.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::{
    auth::SESSION_COOKIE,
    error::AppError,
    models::{session::SessionRecord, user::UserSnapshot},
    services::sessions::short,
    state::AppState,
};

/// Request-scoped view of the current session. Mutations are buffered here and
/// written back by [`session_layer`] once the handler has finished.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

struct SessionInner {
    record: SessionRecord,
    fresh: bool,
    changed: bool,
    destroyed: bool,
}

enum Outcome {
    Unchanged,
    Touch(String),
    Save(SessionRecord),
    Destroy(String),
}

impl Session {
    fn new(record: SessionRecord, fresh: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                record,
                fresh,
                changed: false,
                destroyed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.lock().record.id.clone()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.lock().record.data.get(key)
    }

    pub fn insert<T: Serialize>(&self, key: &str, value: T) -> Result<(), AppError> {
        let value = serde_json::to_value(value)?;
        let mut inner = self.lock();
        inner.record.data.insert(key, value);
        inner.changed = true;
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        let mut inner = self.lock();
        if inner.record.data.remove(key).is_some() {
            inner.changed = true;
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().record.data.is_authenticated()
    }

    pub fn authenticated_user(&self) -> Option<UserSnapshot> {
        let inner = self.lock();
        if inner.record.data.is_authenticated() {
            inner.record.data.user()
        } else {
            None
        }
    }

    /// Marks the session as belonging to `user`.
    pub fn log_in(&self, user: &UserSnapshot) -> Result<(), AppError> {
        let mut inner = self.lock();
        inner.record.data.log_in(user)?;
        inner.changed = true;
        Ok(())
    }

    /// Requests removal of the session and its cookie at the end of the request.
    pub fn destroy(&self) {
        self.lock().destroyed = true;
    }

    fn outcome(&self) -> Outcome {
        let inner = self.lock();
        if inner.destroyed {
            Outcome::Destroy(inner.record.id.clone())
        } else if inner.changed {
            Outcome::Save(inner.record.clone())
        } else if inner.fresh {
            Outcome::Unchanged
        } else {
            Outcome::Touch(inner.record.id.clone())
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Other(anyhow::anyhow!("session layer is not installed")))
    }
}

pub async fn session_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let mut jar = PrivateCookieJar::from_headers(req.headers(), state.cookie_key.clone());

    let existing = match jar.get(SESSION_COOKIE) {
        Some(cookie) => state.sessions.load(cookie.value()).await?,
        None => None,
    };
    let (record, fresh) = match existing {
        Some(record) => (record, false),
        None => {
            let record = state.sessions.create().await?;
            jar = jar.add(session_cookie(record.id.clone(), state.config.cookie_secure));
            (record, true)
        }
    };

    let session = Session::new(record, fresh);
    req.extensions_mut().insert(session.clone());

    let response = next.run(req).await;

    match session.outcome() {
        Outcome::Unchanged => {}
        Outcome::Touch(id) => state.sessions.touch(&id).await?,
        Outcome::Save(mut record) => {
            state.sessions.save(&mut record).await?;
            debug!(session = %short(&record.id), "session saved");
        }
        Outcome::Destroy(id) => {
            state.sessions.destroy(&id).await?;
            // Orphaned access rows are pruned by the reaper.
            if let Err(err) = state.limiter.forget(&id).await {
                warn!(session = %short(&id), "failed to forget rate-limit state: {err}");
            }
            jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
            info!(session = %short(&id), "session destroyed");
        }
    }

    Ok((jar, response).into_response())
}

fn session_cookie(id: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::SessionData;
    use chrono::Utc;
    use sqlx::types::Json;

    fn record() -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: "abc123".into(),
            data: Json(SessionData::default()),
            created_at: now,
            last_modified: now,
            expires_at: now,
        }
    }

    fn handle() -> Session {
        Session::new(record(), true)
    }

    fn snapshot() -> UserSnapshot {
        UserSnapshot {
            id: 1,
            name: "Ada".into(),
            email: "ada@example.com".into(),
        }
    }

    #[test]
    fn untouched_session_is_not_saved() {
        let session = handle();
        assert_eq!(session.get::<String>("theme"), None);
        session.remove("theme");
        assert!(matches!(session.outcome(), Outcome::Unchanged));
    }

    #[test]
    fn untouched_loaded_session_is_touched() {
        let session = Session::new(record(), false);
        let _ = session.get::<String>("theme");
        match session.outcome() {
            Outcome::Touch(id) => assert_eq!(id, "abc123"),
            _ => panic!("expected a touch"),
        }
    }

    #[test]
    fn mutations_are_saved() {
        let session = handle();
        session.insert("theme", "dark").unwrap();
        assert_eq!(session.get::<String>("theme").as_deref(), Some("dark"));
        match session.outcome() {
            Outcome::Save(record) => {
                assert_eq!(record.data.get::<String>("theme").as_deref(), Some("dark"))
            }
            _ => panic!("expected a save"),
        }
    }

    #[test]
    fn log_in_exposes_the_user() {
        let session = handle();
        assert!(session.authenticated_user().is_none());
        session.log_in(&snapshot()).unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.authenticated_user(), Some(snapshot()));
    }

    #[test]
    fn destroy_wins_over_pending_changes() {
        let session = handle();
        session.log_in(&snapshot()).unwrap();
        session.destroy();
        match session.outcome() {
            Outcome::Destroy(id) => assert_eq!(id, "abc123"),
            _ => panic!("expected a destroy"),
        }
    }

    #[test]
    fn clones_share_state() {
        let session = handle();
        let seen_by_handler = session.clone();
        seen_by_handler.insert("n", 1).unwrap();
        assert_eq!(session.get::<i64>("n"), Some(1));
        assert_eq!(session.id(), "abc123");
    }
}
