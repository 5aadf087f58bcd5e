//! In-memory doubles for the database traits.

use crate::executor::{ExecutionResult, StatementExecutor};
use crate::provision::{validate_database_name, DatabaseProvisioner, ProvisionError};
use crate::schema::{Catalog, ColumnDescriptor};
use crate::users::{NewUser, UserError, UserStore};
use crate::DbError;
use async_trait::async_trait;
use nlsql_sql::OperationCategory;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Fixed catalog. Tables are reported in name order, like `information_schema`.
#[derive(Default)]
pub struct MockCatalog {
    tables: Vec<(String, Vec<ColumnDescriptor>)>,
    error: Option<DbError>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
        let columns = columns
            .iter()
            .map(|(name, data_type)| ColumnDescriptor::new(*name, *data_type))
            .collect();
        self.tables.push((name.to_string(), columns));
        self.tables.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    /// Every catalog call fails with `error`.
    pub fn failing(mut self, error: DbError) -> Self {
        self.error = Some(error);
        self
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn table_names(&self) -> Result<Vec<String>, DbError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        Ok(self.tables.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        Ok(self
            .tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, columns)| columns.clone())
            .unwrap_or_default())
    }
}

/// Returns one canned outcome for every statement and records what it was asked to run.
pub struct MockExecutor {
    outcome: Result<ExecutionResult, DbError>,
    executed: Mutex<Vec<(String, OperationCategory)>>,
}

impl MockExecutor {
    pub fn returning(result: ExecutionResult) -> Self {
        Self {
            outcome: Ok(result),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: DbError) -> Self {
        Self {
            outcome: Err(error),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.executed.lock().len()
    }

    pub fn executed(&self) -> Vec<(String, OperationCategory)> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl StatementExecutor for MockExecutor {
    async fn execute(&self, sql: &str, category: OperationCategory) -> Result<ExecutionResult, DbError> {
        self.executed.lock().push((sql.to_string(), category));
        self.outcome.clone()
    }
}

/// Tracks created databases in memory. Names must still be valid identifiers.
#[derive(Default)]
pub struct MockProvisioner {
    existing: Mutex<BTreeSet<String>>,
    table_error: Option<String>,
    created: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table statements fail with `detail` after the database is created.
    pub fn failing_tables(mut self, detail: &str) -> Self {
        self.table_error = Some(detail.to_string());
        self
    }

    pub fn created(&self) -> Vec<(String, Vec<String>)> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl DatabaseProvisioner for MockProvisioner {
    async fn create_database(&self, name: &str, tables: &[String]) -> Result<String, ProvisionError> {
        validate_database_name(name)?;
        if !self.existing.lock().insert(name.to_string()) {
            return Err(ProvisionError::AlreadyExists(name.to_string()));
        }
        self.created.lock().push((name.to_string(), tables.to_vec()));

        match (&self.table_error, tables.is_empty()) {
            (_, true) => Ok(format!("Database '{name}' created successfully")),
            (Some(detail), false) => Err(ProvisionError::Tables {
                name: name.to_string(),
                detail: detail.clone(),
            }),
            (None, false) => Ok(format!("Database '{name}' created successfully with specified tables")),
        }
    }
}

/// `users` table in a vector; ids count up from 1.
#[derive(Default)]
pub struct MockUserStore {
    rows: Mutex<Vec<Value>>,
    error: Option<DbError>,
}

impl MockUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: DbError) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            error: Some(error),
        }
    }
}

#[async_trait]
impl UserStore for MockUserStore {
    async fn list_users(&self) -> Result<Vec<Value>, UserError> {
        if let Some(error) = &self.error {
            return Err(UserError::Db(error.clone()));
        }
        Ok(self.rows.lock().clone())
    }

    async fn add_user(&self, user: &NewUser) -> Result<Value, UserError> {
        if let Some(error) = &self.error {
            return Err(UserError::Db(error.clone()));
        }
        let mut rows = self.rows.lock();
        if rows.iter().any(|row| row["email"] == user.email.as_str()) {
            return Err(UserError::DuplicateEmail);
        }
        let row = json!({
            "id": rows.len() + 1,
            "name": user.name,
            "email": user.email,
            "age": user.age,
        });
        rows.push(row.clone());
        Ok(row)
    }
}
