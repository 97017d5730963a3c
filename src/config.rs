use std::{env, net::SocketAddr, str::FromStr};

use chrono::{Duration, FixedOffset, Offset, Utc};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub cookie_secret: String,
    pub cookie_secure: bool,
    pub session_ttl: Duration,
    pub rate_limit_window: Duration,
    pub todo_retention: Duration,
    pub reaper_offset: FixedOffset,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://sessions.db?mode=rwc".to_string());
        let listen_addr: SocketAddr = parse_var("APP_LISTEN_ADDR", "127.0.0.1:8000")?;

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-session-cookie-secret".to_string());
        let cookie_secure: bool = parse_var("COOKIE_SECURE", "true")?;

        let session_ttl_hours: i64 = parse_var("SESSION_TTL_HOURS", "336")?;
        let window_secs: i64 = parse_var("RATE_LIMIT_WINDOW_SECS", "60")?;
        let retention_days: i64 = parse_var("TODO_RETENTION_DAYS", "30")?;
        let offset_minutes: i32 = parse_var("REAPER_UTC_OFFSET_MINUTES", "0")?;
        let reaper_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            AppError::Config(format!(
                "REAPER_UTC_OFFSET_MINUTES out of range: {offset_minutes}"
            ))
        })?;

        Ok(Self {
            database_url,
            listen_addr,
            cookie_secret,
            cookie_secure,
            session_ttl: positive_duration(
                "SESSION_TTL_HOURS",
                session_ttl_hours,
                Duration::try_hours,
            )?,
            rate_limit_window: positive_duration(
                "RATE_LIMIT_WINDOW_SECS",
                window_secs,
                Duration::try_seconds,
            )?,
            todo_retention: positive_duration(
                "TODO_RETENTION_DAYS",
                retention_days,
                Duration::try_days,
            )?,
            reaper_offset,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            cookie_secret: "change-me-session-cookie-secret".to_string(),
            cookie_secure: true,
            session_ttl: Duration::days(14),
            rate_limit_window: Duration::seconds(60),
            todo_retention: Duration::days(30),
            reaper_offset: Utc.fix(),
        }
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|err| AppError::Config(format!("invalid {name}: {err}")))
}

fn positive_duration(
    name: &str,
    value: i64,
    build: fn(i64) -> Option<Duration>,
) -> Result<Duration, AppError> {
    if value <= 0 {
        return Err(AppError::Config(format!("{name} must be positive, got {value}")));
    }
    build(value).ok_or_else(|| AppError::Config(format!("{name} out of range: {value}")))
}
