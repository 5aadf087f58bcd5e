//! `CREATE DATABASE` plus initial tables.
//!
//! Database creation cannot run inside a transaction or against the target
//! database itself, so the provisioner opens its own short-lived connections
//! (first to the maintenance database, then to the new one) instead of
//! borrowing from the shared pool.

use crate::config::{DbConfig, MAINTENANCE_DATABASE};
use crate::DbError;
use async_trait::async_trait;
use sqlx::{Connection, Executor, PgConnection};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    #[error("Invalid database name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Database '{0}' already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    Database(#[from] DbError),

    /// The database exists now but one of the table statements failed.
    /// Nothing is rolled back.
    #[error("Database '{name}' created, but error creating tables")]
    Tables { name: String, detail: String },
}

impl ProvisionError {
    /// Underlying server error text, where there is one beyond the summary.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Tables { detail, .. } => Some(detail),
            _ => None,
        }
    }
}

/// Longest identifier Postgres keeps without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Accept only plain identifiers: `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes.
pub fn validate_database_name(name: &str) -> Result<(), ProvisionError> {
    let invalid = |reason| ProvisionError::InvalidName {
        name: name.to_string(),
        reason,
    };

    let mut bytes = name.bytes();
    match bytes.next() {
        None => return Err(invalid("name is empty")),
        Some(b) if !(b.is_ascii_alphabetic() || b == b'_') => {
            return Err(invalid("must start with a letter or underscore"))
        }
        Some(_) => {}
    }
    if !bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(invalid("only letters, digits and underscores are allowed"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid("longer than 63 characters"));
    }
    Ok(())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
pub trait DatabaseProvisioner: Send + Sync {
    /// Create `name` and run `tables` in it, in order. Returns the success
    /// message.
    async fn create_database(&self, name: &str, tables: &[String]) -> Result<String, ProvisionError>;
}

pub struct PgProvisioner {
    config: DbConfig,
}

impl PgProvisioner {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    async fn connect(&self, database: &str) -> Result<PgConnection, DbError> {
        let conn = PgConnection::connect_with(&self.config.connect_options(database)).await?;
        Ok(conn)
    }

    async fn create_empty(&self, name: &str) -> Result<(), ProvisionError> {
        let mut admin = self.connect(MAINTENANCE_DATABASE).await?;
        tracing::info!("connected to maintenance database for DDL operations");

        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(name)
            .fetch_optional(&mut admin)
            .await
            .map_err(DbError::from)?;

        let outcome = match exists {
            Some(_) => Err(ProvisionError::AlreadyExists(name.to_string())),
            None => {
                let statement = format!("CREATE DATABASE {}", quote_identifier(name));
                (&mut admin)
                    .execute(statement.as_str())
                    .await
                    .map(|_| ())
                    .map_err(|e| ProvisionError::Database(e.into()))
            }
        };

        if let Err(e) = admin.close().await {
            tracing::debug!(error = %e, "closing maintenance connection failed");
        }
        outcome
    }

    async fn create_tables(&self, name: &str, tables: &[String]) -> Result<(), DbError> {
        let mut conn = self.connect(name).await?;
        tracing::info!(database = name, "connected to new database for table creation");

        let mut outcome = Ok(());
        for statement in tables {
            if let Err(e) = (&mut conn).execute(statement.as_str()).await {
                outcome = Err(DbError::from(e));
                break;
            }
        }

        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "closing provisioning connection failed");
        }
        outcome
    }
}

#[async_trait]
impl DatabaseProvisioner for PgProvisioner {
    async fn create_database(&self, name: &str, tables: &[String]) -> Result<String, ProvisionError> {
        validate_database_name(name)?;

        if let Err(e) = self.create_empty(name).await {
            tracing::error!(database = name, error = %e, "error creating database");
            return Err(e);
        }
        tracing::info!(database = name, "database created");

        if tables.is_empty() {
            return Ok(format!("Database '{name}' created successfully"));
        }

        match self.create_tables(name, tables).await {
            Ok(()) => {
                tracing::info!(database = name, tables = tables.len(), "tables created");
                Ok(format!("Database '{name}' created successfully with specified tables"))
            }
            Err(e) => {
                tracing::error!(database = name, error = %e, "error creating tables in new database");
                Err(ProvisionError::Tables {
                    name: name.to_string(),
                    detail: e.to_string(),
                })
            }
        }
    }
}
