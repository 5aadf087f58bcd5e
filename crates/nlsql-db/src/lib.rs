//! PostgreSQL access for nlsql
//!
//! The pool is an owned resource: callers build one with [`connect_pool`] and
//! hand it to the pieces that need it. Each piece sits behind a trait so the
//! pipeline and server can be exercised with the doubles in [`mock`]:
//!
//! | trait | Postgres impl | role |
//! |-------|---------------|------|
//! | [`Catalog`] | [`PgCatalog`] | `information_schema` reads for the introspector |
//! | [`StatementExecutor`] | [`PgExecutor`] | runs generated SQL |
//! | [`DatabaseProvisioner`] | [`PgProvisioner`] | `CREATE DATABASE` + tables, outside the pool |
//! | [`UserStore`] | [`PgUserStore`] | the sample `users` table |

pub mod config;
pub mod executor;
pub mod mock;
pub mod provision;
pub mod schema;
pub mod users;

pub use config::{connect_pool, DbConfig};
pub use executor::{ExecutionResult, PgExecutor, StatementExecutor};
pub use provision::{validate_database_name, DatabaseProvisioner, PgProvisioner, ProvisionError};
pub use schema::{
    Catalog, ColumnDescriptor, PgCatalog, SchemaDescription, SchemaIntrospector, TableDescriptor,
};
pub use users::{NewUser, PgUserStore, UserError, UserStore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    /// The server rejected a statement; carries the server's message.
    #[error("{0}")]
    Query(String),
    /// Unique constraint violation (SQLSTATE 23505).
    #[error("{0}")]
    UniqueViolation(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("invalid database configuration: {0}")]
    Config(String),
}

impl DbError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => match db.code() {
                Some(code) if code == "23505" => Self::UniqueViolation(db.message().to_string()),
                _ => Self::Query(db.message().to_string()),
            },
            sqlx::Error::Io(e) => Self::Connect(e.to_string()),
            sqlx::Error::Tls(e) => Self::Connect(e.to_string()),
            e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => Self::Connect(e.to_string()),
            sqlx::Error::Configuration(e) => Self::Config(e.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}
