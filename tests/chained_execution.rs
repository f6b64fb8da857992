mod common;

use common::{connection, row, RecordingSource};
use querymesh::executor::ExecutionService;
use querymesh::request::{ChainSpec, DataRequest, SqlQueryRequest};
use querymesh::{EngineConfig, SourceRegistry};
use serde_json::json;
use std::sync::Arc;

fn service_with(source: Arc<RecordingSource>) -> ExecutionService {
    let registry = Arc::new(SourceRegistry::new(EngineConfig::default()));
    registry.register(source);
    ExecutionService::new(registry)
}

fn step(sql: &str, chain: ChainSpec) -> DataRequest {
    DataRequest::Sql(SqlQueryRequest {
        sql: sql.to_string(),
        chain,
    })
}

#[tokio::test]
async fn scalar_output_flows_into_the_next_step() {
    let source = RecordingSource::new("db-1");
    source.push_response(vec![row(&[("customer_id", json!(7))])]);
    source.push_response(vec![
        row(&[("order_id", json!(100))]),
        row(&[("order_id", json!(101))]),
    ]);
    let service = service_with(source.clone());

    let results = service
        .execute_all(
            vec![
                step(
                    "SELECT id AS customer_id FROM customers WHERE email = 'a@example.com'",
                    ChainSpec {
                        source_id: Some("db-1".to_string()),
                        step: Some(1),
                        output_as: Some("customer_id".to_string()),
                        ..ChainSpec::default()
                    },
                ),
                step(
                    "SELECT order_id FROM orders WHERE customer_id = $customer_id",
                    ChainSpec {
                        source_id: Some("db-1".to_string()),
                        step: Some(2),
                        depends_on: Some(1),
                        ..ChainSpec::default()
                    },
                ),
            ],
            &[connection("db-1")],
        )
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.result.success));
    let executed = source.executed_queries();
    assert_eq!(
        executed[1],
        "SELECT order_id FROM orders WHERE customer_id = 7"
    );
}

#[tokio::test]
async fn multi_row_output_becomes_an_in_list() {
    let source = RecordingSource::new("db-1");
    source.push_response(vec![
        row(&[("id", json!(1))]),
        row(&[("id", json!(2))]),
        row(&[("id", json!(3))]),
    ]);
    source.push_response(vec![row(&[("total", json!(9))])]);
    let service = service_with(source.clone());

    let results = service
        .execute_all(
            vec![
                step(
                    "SELECT id FROM segments WHERE region = 'emea'",
                    ChainSpec {
                        source_id: Some("db-1".to_string()),
                        step: Some(1),
                        output_as: Some("segment_ids".to_string()),
                        output_field: Some("id".to_string()),
                        ..ChainSpec::default()
                    },
                ),
                step(
                    "SELECT COUNT(*) AS total FROM accounts WHERE segment_id IN ($segment_ids)",
                    ChainSpec {
                        source_id: Some("db-1".to_string()),
                        step: Some(2),
                        depends_on: Some(1),
                        ..ChainSpec::default()
                    },
                ),
            ],
            &[connection("db-1")],
        )
        .await;

    assert!(results.iter().all(|r| r.result.success));
    assert_eq!(
        source.executed_queries()[1],
        "SELECT COUNT(*) AS total FROM accounts WHERE segment_id IN (1, 2, 3)"
    );
}

#[tokio::test]
async fn text_output_is_quoted_when_substituted() {
    let source = RecordingSource::new("db-1");
    source.push_response(vec![row(&[("region", json!("north-west"))])]);
    source.push_response(vec![row(&[("total", json!(2))])]);
    let service = service_with(source.clone());

    service
        .execute_all(
            vec![
                step(
                    "SELECT region FROM stores WHERE id = 4",
                    ChainSpec {
                        source_id: Some("db-1".to_string()),
                        step: Some(1),
                        output_as: Some("region".to_string()),
                        ..ChainSpec::default()
                    },
                ),
                step(
                    "SELECT COUNT(*) AS total FROM stores WHERE region = $region",
                    ChainSpec {
                        source_id: Some("db-1".to_string()),
                        step: Some(2),
                        depends_on: Some(1),
                        ..ChainSpec::default()
                    },
                ),
            ],
            &[connection("db-1")],
        )
        .await;

    assert_eq!(
        source.executed_queries()[1],
        "SELECT COUNT(*) AS total FROM stores WHERE region = 'north-west'"
    );
}

#[tokio::test]
async fn failed_producer_leaves_dependents_unbound() {
    let source = RecordingSource::new("db-1");
    source.push_response(vec![row(&[("total", json!(0))])]);
    let service = service_with(source.clone());

    let results = service
        .execute_all(
            vec![
                // Rejected by the read-only gate, so its output never binds.
                step(
                    "DELETE FROM customers",
                    ChainSpec {
                        source_id: Some("db-1".to_string()),
                        step: Some(1),
                        output_as: Some("customer_id".to_string()),
                        ..ChainSpec::default()
                    },
                ),
                step(
                    "SELECT COUNT(*) AS total FROM orders WHERE customer_id = $customer_id",
                    ChainSpec {
                        source_id: Some("db-1".to_string()),
                        step: Some(2),
                        depends_on: Some(1),
                        ..ChainSpec::default()
                    },
                ),
            ],
            &[connection("db-1")],
        )
        .await;

    assert!(!results[0].result.success);
    // The unbound token passes through untouched; each result stands alone.
    assert_eq!(
        source.executed_queries()[0],
        "SELECT COUNT(*) AS total FROM orders WHERE customer_id = $customer_id"
    );
}

#[tokio::test]
async fn forward_dependency_fails_the_whole_plan() {
    let source = RecordingSource::new("db-1");
    let service = service_with(source.clone());

    let results = service
        .execute_all(
            vec![step(
                "SELECT 1",
                ChainSpec {
                    source_id: Some("db-1".to_string()),
                    step: Some(1),
                    depends_on: Some(2),
                    ..ChainSpec::default()
                },
            )],
            &[connection("db-1")],
        )
        .await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].result.success);
    assert!(results[0]
        .result
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("invalid query plan"));
    assert_eq!(source.call_count(), 0);
}
