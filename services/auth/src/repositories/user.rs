//! User repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::models::{NewUser, User};

/// Persistence for user records
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User>;

    async fn find_by_username(&self, username: &str) -> DatabaseResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>>;

    async fn list(&self) -> DatabaseResult<Vec<User>>;

    /// Stamp the last login time in a single write
    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()>;

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> DatabaseResult<()>;

    async fn set_active(&self, id: Uuid, is_active: bool) -> DatabaseResult<Option<User>>;

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool>;
}

const USER_COLUMNS: &str =
    "id, username, password_hash, name, role, is_active, last_login, created_at";

fn user_from_row(row: &PgRow) -> DatabaseResult<User> {
    let role: String = row.try_get("role")?;
    let role = role
        .parse()
        .map_err(|e| DatabaseError::Query(sqlx::Error::Decode(Box::new(e))))?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        name: row.try_get("name")?,
        role,
        is_active: row.try_get("is_active")?,
        last_login: row.try_get("last_login")?,
        created_at: row.try_get("created_at")?,
    })
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User> {
        info!("Creating new user: {}", new_user.username);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (username, password_hash, name, role, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .bind(&new_user.name)
        .bind(new_user.role.as_str())
        .bind(new_user.is_active)
        .fetch_one(&self.pool)
        .await?;

        user_from_row(&row)
    }

    async fn find_by_username(&self, username: &str) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn list(&self) -> DatabaseResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> DatabaseResult<()> {
        info!("Replacing password credential for user: {}", id);

        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> DatabaseResult<Option<User>> {
        info!("Setting user {} active={}", id, is_active);

        let row = sqlx::query(&format!(
            "UPDATE users SET is_active = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        info!("Deleting user: {}", id);

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
