use std::sync::Arc;

use crate::{clock::Clock, db::DbPool, error::AppError, models::user::User};

#[derive(Clone)]
pub struct UserService {
    db: DbPool,
    clock: Arc<dyn Clock>,
}

impl UserService {
    pub fn new(db: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Inserts a user, or returns `BadRequest` when the email is taken.
    pub async fn insert(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, AppError> {
        if self.find_by_email(email).await?.is_some() {
            return Err(AppError::BadRequest("Email already exists".into()));
        }

        let now = self.clock.now();
        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO users (name, email, password_hash, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?4)
               RETURNING id, name, email, password_hash, created_at, updated_at"#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::BadRequest("Email already exists".into())
            }
            other => AppError::Storage(other),
        })?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash, created_at, updated_at FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}
