//! Schema introspection: `information_schema` → prompt text.

use crate::DbError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Ordered tables of the `public` schema, as handed to the translator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableDescriptor>,
}

impl SchemaDescription {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Stand-in used when the catalog is empty or unreachable.
    pub fn fallback() -> Self {
        Self {
            tables: vec![TableDescriptor {
                name: "users".to_string(),
                columns: vec![
                    ColumnDescriptor::new("id", "SERIAL PRIMARY KEY"),
                    ColumnDescriptor::new("name", "VARCHAR"),
                    ColumnDescriptor::new("email", "VARCHAR"),
                    ColumnDescriptor::new("age", "INTEGER"),
                ],
            }],
        }
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for table in &self.tables {
            writeln!(f, "Table '{}' with columns:", table.name)?;
            for column in &table.columns {
                writeln!(f, "- {} ({})", column.name, column.data_type)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Read access to the catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Tables in the `public` schema, ordered by name.
    async fn table_names(&self) -> Result<Vec<String>, DbError>;

    /// Columns of `table`, in declaration order.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError>;
}

pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// information_schema columns are `sql_identifier` / `character_data`
// domains, hence the `::text` casts.
const TABLES_QUERY: &str = "SELECT table_name::text \
     FROM information_schema.tables \
     WHERE table_schema = 'public' \
     ORDER BY table_name";

const COLUMNS_QUERY: &str = "SELECT column_name::text, data_type::text \
     FROM information_schema.columns \
     WHERE table_schema = 'public' AND table_name = $1 \
     ORDER BY ordinal_position";

#[async_trait]
impl Catalog for PgCatalog {
    async fn table_names(&self) -> Result<Vec<String>, DbError> {
        let rows: Vec<(String,)> = sqlx::query_as(TABLES_QUERY).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        let rows: Vec<(String, String)> = sqlx::query_as(COLUMNS_QUERY)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(name, data_type)| ColumnDescriptor { name, data_type })
            .collect())
    }
}

#[derive(Clone)]
pub struct SchemaIntrospector {
    catalog: Arc<dyn Catalog>,
}

impl SchemaIntrospector {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Full catalog walk. Errors are returned as-is.
    pub async fn introspect(&self) -> Result<SchemaDescription, DbError> {
        let mut tables = Vec::new();
        for name in self.catalog.table_names().await? {
            let columns = self.catalog.columns(&name).await?;
            tables.push(TableDescriptor { name, columns });
        }
        Ok(SchemaDescription { tables })
    }

    /// Schema text for the translator. Never empty: a catalog error or an
    /// empty `public` schema yields [`SchemaDescription::fallback`].
    pub async fn describe_schema(&self) -> String {
        let description = match self.introspect().await {
            Ok(description) if !description.is_empty() => description,
            Ok(_) => {
                tracing::warn!("no tables in public schema, using fallback schema description");
                SchemaDescription::fallback()
            }
            Err(e) => {
                tracing::warn!(error = %e, "schema introspection failed, using fallback schema description");
                SchemaDescription::fallback()
            }
        };
        description.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCatalog;

    #[test]
    fn renders_tables_in_order() {
        let description = SchemaDescription {
            tables: vec![
                TableDescriptor {
                    name: "orders".to_string(),
                    columns: vec![
                        ColumnDescriptor::new("id", "integer"),
                        ColumnDescriptor::new("total", "numeric"),
                    ],
                },
                TableDescriptor {
                    name: "users".to_string(),
                    columns: vec![ColumnDescriptor::new("email", "character varying")],
                },
            ],
        };
        assert_eq!(
            description.render(),
            "Table 'orders' with columns:\n- id (integer)\n- total (numeric)\n\n\
             Table 'users' with columns:\n- email (character varying)\n\n"
        );
    }

    #[tokio::test]
    async fn walks_catalog() {
        let catalog = MockCatalog::new()
            .with_table("orders", &[("id", "integer"), ("user_id", "integer")])
            .with_table("users", &[("id", "integer"), ("name", "text")]);
        let introspector = SchemaIntrospector::new(Arc::new(catalog));

        let description = introspector.introspect().await.unwrap();
        let names: Vec<_> = description.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["orders", "users"]);
        assert_eq!(description.tables[0].columns[1].name, "user_id");
    }

    #[tokio::test]
    async fn empty_catalog_falls_back() {
        let introspector = SchemaIntrospector::new(Arc::new(MockCatalog::new()));
        let text = introspector.describe_schema().await;
        assert!(!text.is_empty());
        assert_eq!(text, SchemaDescription::fallback().render());
        assert!(text.contains("- id (SERIAL PRIMARY KEY)"));
    }

    #[tokio::test]
    async fn catalog_error_falls_back() {
        let catalog = MockCatalog::new()
            .with_table("users", &[("id", "integer")])
            .failing(DbError::Connect("connection refused".to_string()));
        let introspector = SchemaIntrospector::new(Arc::new(catalog));

        assert!(introspector.introspect().await.is_err());
        assert_eq!(
            introspector.describe_schema().await,
            SchemaDescription::fallback().render()
        );
    }
}
