//! Execution of generated SQL against the shared pool.
//!
//! Statements go over the simple query protocol (a bare `&str` handed to the
//! executor), so results arrive in text format and are decoded by column type
//! name rather than by compile-time Rust types.

use crate::DbError;
use async_trait::async_trait;
use futures::TryStreamExt;
use nlsql_sql::OperationCategory;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgPool, PgRow, PgValueFormat};
use sqlx::{Column, Either, Executor, Row, TypeInfo, ValueRef};

pub type JsonRow = Map<String, Value>;

/// Outcome of one statement.
///
/// Row-returning statements fill `rows`; statements run for their effect
/// leave `rows` empty. `row_count` is the server's count either way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub rows: Vec<JsonRow>,
    pub row_count: u64,
}

impl ExecutionResult {
    pub fn rows(rows: Vec<JsonRow>) -> Self {
        let row_count = rows.len() as u64;
        Self { rows, row_count }
    }

    pub fn affected(row_count: u64) -> Self {
        Self {
            rows: Vec::new(),
            row_count,
        }
    }
}

/// Folds the items of a streamed statement into one [`ExecutionResult`].
///
/// Command tags are summed. Tags that carry no count (`SHOW`, some utility
/// commands) report zero, so the row count never drops below the rows seen.
#[derive(Debug, Default)]
pub(crate) struct ResultCollector {
    rows: Vec<JsonRow>,
    rows_affected: u64,
}

impl ResultCollector {
    pub(crate) fn push_row(&mut self, row: JsonRow) {
        self.rows.push(row);
    }

    pub(crate) fn push_done(&mut self, rows_affected: u64) {
        self.rows_affected += rows_affected;
    }

    pub(crate) fn finish(self) -> ExecutionResult {
        let row_count = self.rows_affected.max(self.rows.len() as u64);
        ExecutionResult {
            rows: self.rows,
            row_count,
        }
    }
}

#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Run one already-classified statement.
    async fn execute(&self, sql: &str, category: OperationCategory) -> Result<ExecutionResult, DbError>;
}

pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatementExecutor for PgExecutor {
    async fn execute(&self, sql: &str, category: OperationCategory) -> Result<ExecutionResult, DbError> {
        let result = if category.reports_affected_rows() {
            let done = (&self.pool).execute(sql).await?;
            ExecutionResult::affected(done.rows_affected())
        } else {
            let mut stream = (&self.pool).fetch_many(sql);
            let mut collector = ResultCollector::default();
            while let Some(item) = stream.try_next().await? {
                match item {
                    Either::Left(done) => collector.push_done(done.rows_affected()),
                    Either::Right(row) => collector.push_row(row_to_json(&row)),
                }
            }
            collector.finish()
        };
        tracing::debug!(%category, row_count = result.row_count, "SQL executed successfully");
        Ok(result)
    }
}

fn row_to_json(row: &PgRow) -> JsonRow {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), column_value(row, column.ordinal())))
        .collect()
}

fn column_value(row: &PgRow, index: usize) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    let type_name = raw.type_info().name().to_string();

    match raw.format() {
        PgValueFormat::Text => raw
            .as_str()
            .map(|text| text_value(&type_name, text))
            .unwrap_or(Value::Null),
        PgValueFormat::Binary => binary_value(row, index, &type_name),
    }
}

/// Decode a text-format value by its Postgres type name.
///
/// Integers and finite floats become JSON numbers, `NUMERIC` stays a string
/// to keep its precision, JSON columns are embedded as-is.
pub(crate) fn text_value(type_name: &str, text: &str) -> Value {
    let fallback = || Value::String(text.to_string());
    match type_name {
        "BOOL" => match text {
            "t" => Value::Bool(true),
            "f" => Value::Bool(false),
            _ => fallback(),
        },
        "INT2" | "INT4" | "INT8" | "OID" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| fallback()),
        "FLOAT4" | "FLOAT8" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(fallback),
        "JSON" | "JSONB" => serde_json::from_str(text).unwrap_or_else(|_| fallback()),
        _ => fallback(),
    }
}

fn binary_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let decoded = match type_name {
        "BOOL" => row.try_get::<bool, _>(index).map(Value::from),
        "INT2" => row.try_get::<i16, _>(index).map(Value::from),
        "INT4" => row.try_get::<i32, _>(index).map(Value::from),
        "INT8" => row.try_get::<i64, _>(index).map(Value::from),
        "FLOAT4" => row.try_get::<f32, _>(index).map(Value::from),
        "FLOAT8" => row.try_get::<f64, _>(index).map(Value::from),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index),
        _ => row.try_get::<String, _>(index).map(Value::String),
    };
    decoded.unwrap_or(Value::Null)
}
