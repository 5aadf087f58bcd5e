//! Textual SQL checks for nlsql
//!
//! Everything in this crate is pure and allocation-light; nothing here talks
//! to a database or parses SQL into an AST:
//! - [`classify`]: leading-keyword → [`OperationCategory`]
//! - [`contains_create_database`]: the safety gate for the ad-hoc query path
//! - [`split_statements`]: quote/comment aware statement scanner
//! - [`extract_table_statements`]: `CREATE DATABASE` + `CREATE TABLE` script splitting
//!
//! ```text
//!   "CREATE DATABASE shop; CREATE TABLE items (...);"
//!            │
//!            ▼
//!   ┌─────────────────┐     ┌──────────────────────┐
//!   │ split_statements│────►│ extract_table_stmts  │──► { shop, [CREATE TABLE items (...);] }
//!   └─────────────────┘     └──────────────────────┘
//! ```

pub mod classify;
pub mod extract;
pub mod scanner;

pub use classify::{classify, contains_create_database, OperationCategory};
pub use extract::{extract_table_statements, CompoundExtraction, ExtractError};
pub use scanner::{split_statements, LiteralKind, ScanError, Statement};
