//! Command orchestration and response shaping.

use crate::PipelineError;
use nlsql_db::{ExecutionResult, SchemaIntrospector, StatementExecutor};
use nlsql_db::executor::JsonRow;
use nlsql_llm::Translator;
use nlsql_sql::{classify, contains_create_database, split_statements, OperationCategory};
use serde::Serialize;
use std::sync::Arc;

/// Category-dependent part of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    /// `read`: the rows themselves.
    Rows {
        result: Vec<JsonRow>,
        #[serde(rename = "rowCount")]
        row_count: u64,
    },
    /// `write` / `ddl`: a count and a summary, never rows.
    Affected {
        #[serde(rename = "affectedRows")]
        affected_rows: u64,
        message: String,
    },
    /// `other` / `unknown`: the execution result untouched.
    Raw { result: ExecutionResult },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub sql: String,
    pub operation_type: OperationCategory,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Shape an execution result according to the statement's category.
pub fn shape_response(sql: String, category: OperationCategory, result: ExecutionResult) -> CommandResponse {
    let outcome = match category {
        OperationCategory::Read => Outcome::Rows {
            row_count: result.row_count,
            result: result.rows,
        },
        OperationCategory::Write | OperationCategory::Ddl => Outcome::Affected {
            affected_rows: result.row_count,
            message: format!(
                "Operation completed successfully. {} rows affected.",
                result.row_count
            ),
        },
        OperationCategory::Other | OperationCategory::Unknown => Outcome::Raw { result },
    };
    CommandResponse {
        sql,
        operation_type: category,
        outcome,
    }
}

/// schema → translate → safety checks → classify → execute → shape.
///
/// Holds no per-request state; one instance serves concurrent commands.
#[derive(Clone)]
pub struct CommandPipeline {
    introspector: SchemaIntrospector,
    translator: Translator,
    executor: Arc<dyn StatementExecutor>,
}

impl CommandPipeline {
    pub fn new(
        introspector: SchemaIntrospector,
        translator: Translator,
        executor: Arc<dyn StatementExecutor>,
    ) -> Self {
        Self {
            introspector,
            translator,
            executor,
        }
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub async fn run(&self, command: &str) -> Result<CommandResponse, PipelineError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(PipelineError::EmptyCommand);
        }

        let schema = self.introspector.describe_schema().await;
        let sql = self
            .translator
            .translate(command, &schema)
            .await
            .map_err(PipelineError::Translation)?;

        check_executable(&sql)?;

        let category = classify(&sql);
        tracing::debug!(%category, "operation type");

        let result = self.executor.execute(&sql, category).await.map_err(|source| {
            tracing::error!(error = %source, sql = %sql, "error executing SQL");
            PipelineError::Execution {
                sql: sql.clone(),
                source,
            }
        })?;

        Ok(shape_response(sql, category, result))
    }
}

/// Refuse SQL the single-statement execution path must not run.
///
/// Text the scanner cannot split (an unterminated quote, say) is passed on
/// so the server reports the syntax error.
pub fn check_executable(sql: &str) -> Result<(), PipelineError> {
    if contains_create_database(sql) {
        tracing::warn!(sql = %sql, "CREATE DATABASE in generated SQL, refusing to execute");
        return Err(PipelineError::UnsafeStatement { sql: sql.to_string() });
    }

    if let Ok(statements) = split_statements(sql) {
        if statements.len() > 1 {
            tracing::warn!(count = statements.len(), "multi-statement SQL, refusing to execute");
            return Err(PipelineError::MultipleStatements {
                sql: sql.to_string(),
                count: statements.len(),
            });
        }
    }
    Ok(())
}
