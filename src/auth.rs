use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::info;

use crate::{
    error::AppError,
    models::user::{User, UserSnapshot},
    state::AppState,
};

pub const SESSION_COOKIE: &str = "token";

/// The user behind an authenticated session. Only available on routes
/// behind the auth gate.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserSnapshot);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserSnapshot>()
            .cloned()
            .map(Self)
            .ok_or(AppError::Unauthorized)
    }
}

pub async fn register_user(
    state: &AppState,
    name: &str,
    email: &str,
    password: &str,
) -> Result<User, AppError> {
    let name = name.trim();
    let email = normalize_email(email);
    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest("Some Fields are not provided".into()));
    }

    let password_hash = hash_password(password.to_owned()).await?;
    let user = state.users.insert(name, &email, &password_hash).await?;
    info!(user_id = user.id, "registered user");
    Ok(user)
}

pub async fn authenticate_user(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<User, AppError> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest("Some Fields are not provided".into()));
    }

    let Some(user) = state.users.find_by_email(&email).await? else {
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password(password.to_owned(), user.password_hash.clone()).await? {
        return Err(AppError::InvalidCredentials);
    }
    Ok(user)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AppError::Other(anyhow::anyhow!("hashing password: {err}")))
    })
    .await
    .map_err(|err| AppError::Other(err.into()))?
}

async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)
            .map_err(|err| AppError::Other(anyhow::anyhow!("stored hash unreadable: {err}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|err| AppError::Other(err.into()))?
}
