//! Pipeline failures and their HTTP rendering.
//!
//! Each [`PipelineError`] maps to a stable `kind`, a status code and the JSON
//! error body the server returns.

use nlsql_db::DbError;
use nlsql_llm::LLMError;
use serde_json::{json, Map, Value};

pub const CREATE_DATABASE_DETAILS: &str = "CREATE DATABASE cannot be executed through this endpoint. \
     Please use the /create-database endpoint instead.";
pub const CREATE_DATABASE_SUGGESTION: &str =
    "Use POST /create-database with a JSON body containing {dbName: 'your_db_name'}";

/// Why a command did not produce a response.
///
/// `EmptyCommand` and `UnsafeStatement` are hard stops decided before the
/// database is touched; the rest carry whatever the failing stage reported.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("Natural language command is required.")]
    EmptyCommand,

    #[error("Could not generate SQL from natural language command")]
    Translation(#[source] LLMError),

    #[error("CREATE DATABASE command detected")]
    UnsafeStatement { sql: String },

    #[error("Only a single SQL statement can be executed per command")]
    MultipleStatements { sql: String, count: usize },

    #[error("Could not execute the SQL query.")]
    Execution {
        sql: String,
        #[source]
        source: DbError,
    },
}

impl PipelineError {
    /// Machine-readable discriminator, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyCommand => "invalid_input",
            Self::Translation(_) => "translation_failed",
            Self::UnsafeStatement { .. } => "unsafe_statement",
            Self::MultipleStatements { .. } => "unsupported_statement",
            Self::Execution { .. } => "execution_failed",
        }
    }

    /// HTTP status: caller mistakes are 400, upstream and database failures 500.
    pub fn status(&self) -> u16 {
        match self {
            Self::EmptyCommand | Self::UnsafeStatement { .. } | Self::MultipleStatements { .. } => 400,
            Self::Translation(_) | Self::Execution { .. } => 500,
        }
    }

    /// Generated SQL, when the pipeline got that far.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::UnsafeStatement { sql } | Self::MultipleStatements { sql, .. } | Self::Execution { sql, .. } => {
                Some(sql)
            }
            Self::EmptyCommand | Self::Translation(_) => None,
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            Self::EmptyCommand => None,
            Self::Translation(e) => Some(e.to_string()),
            Self::UnsafeStatement { .. } => Some(CREATE_DATABASE_DETAILS.to_string()),
            Self::MultipleStatements { count, .. } => Some(format!(
                "The generated SQL contains {count} statements; rephrase the command as a single operation."
            )),
            Self::Execution { source, .. } => Some(source.to_string()),
        }
    }

    /// Response body: `{kind, error, details?, sql?, suggestion?}`.
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("kind".to_string(), json!(self.kind()));
        body.insert("error".to_string(), json!(self.to_string()));
        if let Some(details) = self.details() {
            body.insert("details".to_string(), json!(details));
        }
        if let Some(sql) = self.sql() {
            body.insert("sql".to_string(), json!(sql));
        }
        if matches!(self, Self::UnsafeStatement { .. }) {
            body.insert("suggestion".to_string(), json!(CREATE_DATABASE_SUGGESTION));
        }
        Value::Object(body)
    }
}
