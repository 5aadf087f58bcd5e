//! System prompt for SQL generation.

/// Route callers are sent to when they need a new database.
pub const CREATE_DATABASE_ROUTE: &str = "/create-database";

const STATEMENT_FAMILIES: &[&str] = &[
    "SELECT queries, including JOINs, GROUP BY, HAVING, ORDER BY and LIMIT",
    "INSERT, UPDATE and DELETE statements",
    "CREATE TABLE, ALTER TABLE and DROP TABLE statements",
    "CREATE INDEX, constraints and triggers",
    "aggregations and window functions",
    "common table expressions (WITH ...)",
];

/// Build the system message for a translation request.
///
/// `schema` is embedded verbatim; it is expected to be the output of the
/// schema introspector and is never empty.
pub fn system_prompt(schema: &str) -> String {
    let families = STATEMENT_FAMILIES
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You translate natural-language requests into a single PostgreSQL statement.

The database has the following structure:

{schema}

You may produce any valid PostgreSQL, for example:
{families}

Never produce CREATE DATABASE. It cannot run on this connection because it is not allowed inside a transaction block; users who need a new database must call the dedicated {CREATE_DATABASE_ROUTE} endpoint instead.

Write clean, efficient, correct PostgreSQL.
Reply with the raw SQL statement only: no explanations, no comments, no markdown, no backticks."#,
        schema = schema.trim_end(),
    )
}
