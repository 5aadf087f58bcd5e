//! Statement classification by leading keyword.
//!
//! Classification is a prefix match on the raw text. A statement that starts
//! with whitespace or a comment is reported as [`OperationCategory::Other`];
//! callers that want a better answer must normalise the text first.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of effect a statement has, as far as response shaping cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationCategory {
    /// `SELECT`
    Read,
    /// `INSERT`, `UPDATE`, `DELETE`
    Write,
    /// `CREATE`, `ALTER`, `DROP`
    Ddl,
    /// Anything else (`WITH`, `EXPLAIN`, `GRANT`, leading comments, ...)
    Other,
    /// Empty input.
    Unknown,
}

impl OperationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Ddl => "ddl",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }

    /// Statements whose interesting result is an affected-row count.
    pub fn reports_affected_rows(&self) -> bool {
        matches!(self, Self::Write | Self::Ddl)
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const LEADING_KEYWORDS: &[(&str, OperationCategory)] = &[
    ("select", OperationCategory::Read),
    ("insert", OperationCategory::Write),
    ("update", OperationCategory::Write),
    ("delete", OperationCategory::Write),
    ("create", OperationCategory::Ddl),
    ("alter", OperationCategory::Ddl),
    ("drop", OperationCategory::Ddl),
];

/// Classify `sql` by its leading keyword (case-insensitive prefix match).
pub fn classify(sql: &str) -> OperationCategory {
    if sql.is_empty() {
        return OperationCategory::Unknown;
    }

    let bytes = sql.as_bytes();
    LEADING_KEYWORDS
        .iter()
        .find(|(keyword, _)| {
            bytes
                .get(..keyword.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(keyword.as_bytes()))
        })
        .map(|(_, category)| *category)
        .unwrap_or(OperationCategory::Other)
}

/// True when `sql` contains `CREATE <whitespace> DATABASE` anywhere, in any casing.
///
/// Unanchored, so it also fires inside later statements, comments and string
/// literals.
pub fn contains_create_database(sql: &str) -> bool {
    if sql.is_empty() {
        return false;
    }

    let lower = sql.to_ascii_lowercase();
    lower.match_indices("create").any(|(idx, kw)| {
        let after = &lower[idx + kw.len()..];
        let rest = after.trim_start();
        rest.len() < after.len() && rest.starts_with("database")
    })
}
