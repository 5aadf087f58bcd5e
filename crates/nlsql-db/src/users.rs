//! The sample `users` table behind `/data` and `/add-user`.

use crate::DbError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub age: i32,
}

impl NewUser {
    /// Read a request body. `name`, `email` and `age` must all be present and
    /// non-empty; an age of zero counts as missing.
    pub fn from_json(body: &Value) -> Result<Self, UserError> {
        let text = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let age = body
            .get("age")
            .and_then(|v| v.as_i64().or_else(|| v.as_str()?.trim().parse().ok()))
            .filter(|age| *age != 0)
            .and_then(|age| i32::try_from(age).ok());

        match (text("name"), text("email"), age) {
            (Some(name), Some(email), Some(age)) => Ok(Self { name, email, age }),
            _ => Err(UserError::MissingFields),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserError {
    #[error("All fields are required")]
    MissingFields,
    #[error("Email already exists")]
    DuplicateEmail,
    #[error(transparent)]
    Db(#[from] DbError),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Every row of `users`, as JSON objects.
    async fn list_users(&self) -> Result<Vec<Value>, UserError>;

    /// Insert `user` and return the stored row.
    async fn add_user(&self, user: &NewUser) -> Result<Value, UserError>;
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn list_users(&self) -> Result<Vec<Value>, UserError> {
        let rows: Vec<Value> = sqlx::query_scalar("SELECT to_jsonb(users) FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(rows)
    }

    async fn add_user(&self, user: &NewUser) -> Result<Value, UserError> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(&user.email)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from)?;
        if taken {
            return Err(UserError::DuplicateEmail);
        }

        // The EXISTS check races with concurrent inserts; a unique index on
        // `email` turns the loser into a 23505.
        let row: Value = sqlx::query_scalar(
            "INSERT INTO users (name, email, age) VALUES ($1, $2, $3) RETURNING to_jsonb(users)",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.age)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            e if e.is_unique_violation() => UserError::DuplicateEmail,
            e => UserError::Db(e),
        })?;

        tracing::info!(email = %user.email, "user added");
        Ok(row)
    }
}
