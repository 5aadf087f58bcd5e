//! Compound `CREATE DATABASE` script extraction.
//!
//! A database cannot be created from the ad-hoc query path, so scripts like
//!
//! ```sql
//! CREATE DATABASE shop;
//! CREATE TABLE items (id SERIAL PRIMARY KEY, name VARCHAR(100));
//! ```
//!
//! are split into a database name plus the table statements, which the
//! provisioning endpoint then replays against the new database.

use crate::classify::contains_create_database;
use crate::scanner::{split_statements, ScanError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundExtraction {
    pub database_name: String,
    /// Complete `CREATE TABLE ...;` statements, in source order.
    pub table_statements: Vec<String>,
}

impl CompoundExtraction {
    pub fn message(&self) -> String {
        format!(
            "Found {} table creation statements",
            self.table_statements.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("SQL statement is required")]
    MissingStatement,
    #[error("No CREATE DATABASE statement found")]
    NoCreateDatabase,
    #[error("Could not extract database name")]
    MissingDatabaseName,
    #[error("could not scan SQL: {0}")]
    Scan(#[from] ScanError),
}

/// Pull the database name and every terminated `CREATE TABLE` statement out of `sql`.
///
/// Keywords are matched anywhere in a statement's code, so a missing `;`
/// between clauses does not hide them. The first `CREATE DATABASE` followed by
/// a `[A-Za-z0-9_]` run names the database. Each `;`-terminated statement
/// contributes at most one table statement, from its first `CREATE TABLE`
/// through the `;`. Zero tables is not an error.
pub fn extract_table_statements(sql: &str) -> Result<CompoundExtraction, ExtractError> {
    if sql.trim().is_empty() {
        return Err(ExtractError::MissingStatement);
    }
    if !contains_create_database(sql) {
        return Err(ExtractError::NoCreateDatabase);
    }

    let statements = split_statements(sql)?;

    let mut database_name = None;
    for stmt in &statements {
        database_name = stmt
            .find_keywords(&["create", "database"])?
            .into_iter()
            .map(|(_, rest)| leading_identifier(rest))
            .find(|name| !name.is_empty());
        if database_name.is_some() {
            break;
        }
    }
    let database_name = database_name
        .ok_or(ExtractError::MissingDatabaseName)?
        .to_string();

    let mut table_statements = Vec::new();
    for stmt in statements.iter().filter(|stmt| stmt.terminated) {
        let table = stmt
            .find_keywords(&["create", "table"])?
            .into_iter()
            .find(|(_, rest)| !rest.trim_end_matches(';').trim().is_empty());
        if let Some((start, _)) = table {
            table_statements.push(stmt.text[start..].to_string());
        }
    }

    Ok(CompoundExtraction {
        database_name,
        table_statements,
    })
}

fn leading_identifier(text: &str) -> &str {
    let end = text
        .bytes()
        .position(|b| !(b.is_ascii_alphanumeric() || b == b'_'))
        .unwrap_or(text.len());
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_database_and_single_table() {
        let out = extract_table_statements(
            "CREATE DATABASE shop; CREATE TABLE items (id SERIAL PRIMARY KEY, name VARCHAR(100));",
        )
        .unwrap();
        assert_eq!(out.database_name, "shop");
        assert_eq!(
            out.table_statements,
            vec!["CREATE TABLE items (id SERIAL PRIMARY KEY, name VARCHAR(100));"]
        );
        assert_eq!(out.message(), "Found 1 table creation statements");
    }

    #[test]
    fn preserves_order_and_source_casing() {
        let sql = "create database Inventory_2;\n\
                   create table a (id int);\n\
                   INSERT INTO a VALUES (1);\n\
                   Create Table b (note text default 'x;y');\n";
        let out = extract_table_statements(sql).unwrap();
        assert_eq!(out.database_name, "Inventory_2");
        assert_eq!(
            out.table_statements,
            vec![
                "create table a (id int);",
                "Create Table b (note text default 'x;y');"
            ]
        );
    }

    #[test]
    fn zero_tables_is_success() {
        let out = extract_table_statements("CREATE DATABASE empty_one;").unwrap();
        assert_eq!(out.database_name, "empty_one");
        assert!(out.table_statements.is_empty());
        assert_eq!(out.message(), "Found 0 table creation statements");
    }

    #[test]
    fn unterminated_table_statement_is_ignored() {
        let out =
            extract_table_statements("CREATE DATABASE d; CREATE TABLE t (id int)").unwrap();
        assert!(out.table_statements.is_empty());
    }

    #[test]
    fn creation_clause_may_follow_other_statements() {
        let out = extract_table_statements("SELECT 1; CREATE DATABASE later;").unwrap();
        assert_eq!(out.database_name, "later");
    }

    #[test]
    fn missing_separator_after_database_clause() {
        let out = extract_table_statements(
            "CREATE DATABASE shop\nCREATE TABLE items (id SERIAL PRIMARY KEY, name VARCHAR(100));",
        )
        .unwrap();
        assert_eq!(out.database_name, "shop");
        assert_eq!(
            out.table_statements,
            vec!["CREATE TABLE items (id SERIAL PRIMARY KEY, name VARCHAR(100));"]
        );
    }

    #[test]
    fn database_clause_after_unterminated_statement() {
        let out = extract_table_statements("SELECT 1\nCREATE DATABASE shop;").unwrap();
        assert_eq!(out.database_name, "shop");
        assert!(out.table_statements.is_empty());
    }

    #[test]
    fn failure_outcomes() {
        assert_eq!(
            extract_table_statements(""),
            Err(ExtractError::MissingStatement)
        );
        assert_eq!(
            extract_table_statements("CREATE TABLE t (id int);"),
            Err(ExtractError::NoCreateDatabase)
        );
        assert_eq!(
            extract_table_statements("CREATE DATABASE \"quoted\";"),
            Err(ExtractError::MissingDatabaseName)
        );
        assert_eq!(
            extract_table_statements("SELECT 'create database x';"),
            Err(ExtractError::MissingDatabaseName)
        );
        assert!(matches!(
            extract_table_statements("CREATE DATABASE d; CREATE TABLE t (a text default 'x);"),
            Err(ExtractError::Scan(_))
        ));
    }

    #[test]
    fn error_messages_are_human_readable() {
        assert_eq!(
            ExtractError::NoCreateDatabase.to_string(),
            "No CREATE DATABASE statement found"
        );
        assert_eq!(
            ExtractError::MissingStatement.to_string(),
            "SQL statement is required"
        );
    }

    #[test]
    fn serializes_in_camel_case() {
        let out = extract_table_statements("CREATE DATABASE d; CREATE TABLE t (id int);").unwrap();
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["databaseName"], "d");
        assert_eq!(json["tableStatements"][0], "CREATE TABLE t (id int);");
    }
}
