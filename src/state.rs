use std::sync::Arc;

use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use crate::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    db::DbPool,
    services::{
        rate_limit::RateLimiter, sessions::SessionStore, todos::TodoService, users::UserService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub sessions: SessionStore,
    pub limiter: RateLimiter,
    pub users: UserService,
    pub todos: TodoService,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        Self::with_clock(config, db, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AppConfig, db: DbPool, clock: Arc<dyn Clock>) -> Self {
        let digest = Sha512::digest(config.cookie_secret.as_bytes());
        let cookie_key = Key::from(&digest[..]);

        let sessions = SessionStore::new(db.clone(), config.session_ttl, clock.clone());
        let limiter = RateLimiter::new(db.clone(), config.rate_limit_window);
        let users = UserService::new(db.clone(), clock.clone());
        let todos = TodoService::new(db.clone(), clock.clone());

        Self {
            config,
            clock,
            sessions,
            limiter,
            users,
            todos,
            cookie_key,
        }
    }
}
