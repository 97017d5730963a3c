use std::sync::Arc;

use uuid::Uuid;

use crate::{clock::Clock, db::DbPool, error::AppError, models::todo::Todo};

const TODO_COLUMNS: &str =
    "id, owner_id, todo, is_deleted, deletion_timestamp, created_at, updated_at";

#[derive(Clone)]
pub struct TodoService {
    db: DbPool,
    clock: Arc<dyn Clock>,
}

impl TodoService {
    pub fn new(db: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn create(&self, owner_id: i64, text: &str) -> Result<Todo, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("Todo text is required".into()));
        }

        let now = self.clock.now();
        let todo = sqlx::query_as::<_, Todo>(&format!(
            "INSERT INTO todos (id, owner_id, todo, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4) RETURNING {TODO_COLUMNS}"
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(owner_id)
        .bind(text)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => AppError::NotFound,
            other => AppError::Storage(other),
        })?;
        Ok(todo)
    }

    /// Live todos of one owner, newest first.
    pub async fn list(&self, owner_id: i64) -> Result<Vec<Todo>, AppError> {
        let todos = sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE owner_id = ?1 AND is_deleted = 0
             ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.db)
        .await?;
        Ok(todos)
    }

    /// Direct lookup; soft-deleted todos stay visible until reaped.
    pub async fn get(&self, owner_id: i64, id: &str) -> Result<Todo, AppError> {
        sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1 AND owner_id = ?2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound)
    }

    /// Flags the todo as deleted. Deleting twice keeps the first timestamp.
    pub async fn soft_delete(&self, owner_id: i64, id: &str) -> Result<Todo, AppError> {
        let now = self.clock.now();
        sqlx::query(
            r#"UPDATE todos SET is_deleted = 1, deletion_timestamp = ?3, updated_at = ?3
               WHERE id = ?1 AND owner_id = ?2 AND is_deleted = 0"#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(now)
        .execute(&self.db)
        .await?;
        self.get(owner_id, id).await
    }

    pub async fn restore(&self, owner_id: i64, id: &str) -> Result<Todo, AppError> {
        let now = self.clock.now();
        sqlx::query(
            r#"UPDATE todos SET is_deleted = 0, deletion_timestamp = NULL, updated_at = ?3
               WHERE id = ?1 AND owner_id = ?2 AND is_deleted = 1"#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(now)
        .execute(&self.db)
        .await?;
        self.get(owner_id, id).await
    }

    pub async fn list_soft_deleted(&self) -> Result<Vec<Todo>, AppError> {
        let todos = sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE is_deleted = 1"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(todos)
    }

    /// Permanently removes the given todos, but only ones still flagged as
    /// deleted, so a restore racing the reaper wins.
    pub async fn purge(&self, ids: &[String]) -> Result<u64, AppError> {
        let mut removed = 0;
        let mut tx = self.db.begin().await?;
        for id in ids {
            removed += sqlx::query("DELETE FROM todos WHERE id = ?1 AND is_deleted = 1")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }
}
