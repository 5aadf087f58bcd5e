//! CommandPipeline end to end over mock provider, catalog and executor.

use nlsql_db::mock::{MockCatalog, MockExecutor};
use nlsql_db::{DbError, ExecutionResult, SchemaIntrospector};
use nlsql_llm::{LLMError, MockProvider, Role, Translator};
use nlsql_pipeline::{CommandPipeline, Outcome, PipelineError};
use nlsql_sql::OperationCategory;
use proptest::prelude::*;
use std::sync::Arc;

struct Harness {
    provider: Arc<MockProvider>,
    executor: Arc<MockExecutor>,
    pipeline: CommandPipeline,
}

fn harness(provider: MockProvider, catalog: MockCatalog, executor: MockExecutor) -> Harness {
    let provider = Arc::new(provider);
    let executor = Arc::new(executor);
    let pipeline = CommandPipeline::new(
        SchemaIntrospector::new(Arc::new(catalog)),
        Translator::new(provider.clone()),
        executor.clone(),
    );
    Harness {
        provider,
        executor,
        pipeline,
    }
}

fn users_catalog() -> MockCatalog {
    MockCatalog::new().with_table(
        "users",
        &[("id", "integer"), ("name", "character varying"), ("age", "integer")],
    )
}

#[tokio::test]
async fn empty_command_touches_nothing() {
    let h = harness(
        MockProvider::always("SELECT 1;"),
        users_catalog(),
        MockExecutor::returning(ExecutionResult::default()),
    );

    for command in ["", "   ", "\n\t"] {
        assert_eq!(h.pipeline.run(command).await, Err(PipelineError::EmptyCommand));
    }
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.executor.calls(), 0);
}

#[tokio::test]
async fn read_command_returns_rows() {
    let mut row = serde_json::Map::new();
    row.insert("name".to_string(), serde_json::json!("Ada"));
    let h = harness(
        MockProvider::always("```sql\nSELECT name FROM users;\n```"),
        users_catalog(),
        MockExecutor::returning(ExecutionResult::rows(vec![row])),
    );

    let response = h.pipeline.run("list user names").await.unwrap();
    assert_eq!(response.sql, "SELECT name FROM users;");
    assert_eq!(response.operation_type, OperationCategory::Read);
    assert!(matches!(response.outcome, Outcome::Rows { row_count: 1, .. }));
    assert_eq!(
        h.executor.executed(),
        vec![("SELECT name FROM users;".to_string(), OperationCategory::Read)]
    );
}

#[tokio::test]
async fn write_command_reports_affected_rows() {
    let h = harness(
        MockProvider::always("UPDATE users SET age = age + 1;"),
        users_catalog(),
        MockExecutor::returning(ExecutionResult::affected(4)),
    );

    let response = h.pipeline.run("everyone had a birthday").await.unwrap();
    assert_eq!(response.operation_type, OperationCategory::Write);
    assert_eq!(
        response.outcome,
        Outcome::Affected {
            affected_rows: 4,
            message: "Operation completed successfully. 4 rows affected.".to_string()
        }
    );
}

#[tokio::test]
async fn prompt_carries_introspected_schema() {
    let h = harness(
        MockProvider::always("SELECT 1;"),
        users_catalog(),
        MockExecutor::returning(ExecutionResult::default()),
    );
    h.pipeline.run("anything").await.unwrap();

    let requests = h.provider.requests();
    let system = &requests[0].messages[0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("Table 'users' with columns:"));
    assert!(system.content.contains("- name (character varying)"));
    assert_eq!(requests[0].messages[1].content, "anything");
}

#[tokio::test]
async fn unreachable_catalog_still_translates_with_fallback() {
    let h = harness(
        MockProvider::always("SELECT * FROM users;"),
        MockCatalog::new().failing(DbError::Connect("timeout".to_string())),
        MockExecutor::returning(ExecutionResult::default()),
    );
    assert!(h.pipeline.run("show users").await.is_ok());

    let system = &h.provider.requests()[0].messages[0].content;
    assert!(system.contains("- id (SERIAL PRIMARY KEY)"));
}

#[tokio::test]
async fn translation_failure_stops_before_execution() {
    let h = harness(
        MockProvider::failing(LLMError::Network("connection reset".to_string())),
        users_catalog(),
        MockExecutor::returning(ExecutionResult::default()),
    );

    let err = h.pipeline.run("show users").await.unwrap_err();
    assert_eq!(err.kind(), "translation_failed");
    assert_eq!(err.status(), 500);
    assert_eq!(err.to_json()["details"], "Network error: connection reset");
    assert_eq!(h.executor.calls(), 0);
}

#[tokio::test]
async fn execution_failure_echoes_sql() {
    let h = harness(
        MockProvider::always("SELECT * FROM missing;"),
        users_catalog(),
        MockExecutor::failing(DbError::Query("relation \"missing\" does not exist".to_string())),
    );

    let err = h.pipeline.run("show missing").await.unwrap_err();
    assert_eq!(err.kind(), "execution_failed");
    assert_eq!(err.sql(), Some("SELECT * FROM missing;"));
    assert_eq!(h.executor.calls(), 1);
}

#[tokio::test]
async fn multi_statement_reply_is_refused() {
    let h = harness(
        MockProvider::always("DELETE FROM orders; DELETE FROM users;"),
        users_catalog(),
        MockExecutor::returning(ExecutionResult::default()),
    );

    let err = h.pipeline.run("wipe everything").await.unwrap_err();
    assert_eq!(err.kind(), "unsupported_statement");
    assert_eq!(err.status(), 400);
    assert_eq!(h.executor.calls(), 0);
}

fn keyword_case() -> impl Strategy<Value = String> {
    proptest::collection::vec(any::<bool>(), 15).prop_map(|upper| {
        "create database"
            .chars()
            .zip(upper)
            .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn create_database_never_reaches_executor(
        clause in keyword_case(),
        prefix in "(SELECT 1; |-- note\n|)",
        name in "[a-z_][a-z0-9_]{0,12}",
    ) {
        let reply = format!("{prefix}{clause} {name};");
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let h = harness(
            MockProvider::always(&reply),
            users_catalog(),
            MockExecutor::returning(ExecutionResult::default()),
        );

        let err = rt.block_on(h.pipeline.run("make me a database")).unwrap_err();
        prop_assert_eq!(err.kind(), "unsafe_statement");
        prop_assert_eq!(err.sql(), Some(reply.trim()));
        prop_assert_eq!(h.executor.calls(), 0);
    }
}
