//! Unified execution service.
//!
//! Dispatches each request to its data source in plan order, binding chained
//! output variables between steps. One request's failure never aborts the
//! batch: every outcome lands as its own `QueryResult`, annotated with the
//! originating connection, elapsed time, and the request's explanation.

use crate::planner::{QueryPlanner, VariableBindings};
use crate::request::{DataRequest, ExecutionResult};
use crate::safety::QueryValidator;
use crate::source::{ConnectionRecord, SourceRegistry};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// One request's outcome inside the aggregated envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub connection_id: String,
    pub connection_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

impl QueryResult {
    fn failed(request: &DataRequest, connection_id: &str, connection_name: &str, message: String) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            connection_name: connection_name.to_string(),
            explanation: request.explanation().map(str::to_string),
            result: ExecutionResult::failure(message),
        }
    }
}

pub struct ExecutionService {
    registry: Arc<SourceRegistry>,
}

impl ExecutionService {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self { registry }
    }

    /// Execute a batch of possibly-chained requests against the given
    /// connections. Requests without a `sourceId` fall back to the first
    /// connection.
    pub async fn execute_all(
        &self,
        requests: Vec<DataRequest>,
        connections: &[ConnectionRecord],
    ) -> Vec<QueryResult> {
        let steps = match QueryPlanner::order(requests) {
            Ok(steps) => steps,
            Err(e) => {
                return vec![QueryResult {
                    connection_id: String::new(),
                    connection_name: String::new(),
                    explanation: None,
                    result: ExecutionResult::failure(format!("invalid query plan: {}", e)),
                }]
            }
        };

        let mut bindings = VariableBindings::new();
        let mut results = Vec::new();

        for step in steps {
            for mut request in step.requests {
                let record = resolve_connection(&request, connections);
                let Some(record) = record else {
                    let wanted = request.chain().source_id.clone().unwrap_or_default();
                    results.push(QueryResult::failed(
                        &request,
                        &wanted,
                        "",
                        format!("connection not found: {}", wanted),
                    ));
                    continue;
                };

                // Bind earlier outputs into this request's query text.
                if !bindings.is_empty() {
                    if let Some(text) = request.query_text_mut() {
                        *text = QueryPlanner::substitute(text, &bindings);
                    }
                }

                // The read-only gate sits in front of every SQL dispatch;
                // sources validate again themselves, so no path skips it.
                if let DataRequest::Sql(sql_request) = &request {
                    let outcome = QueryValidator::validate(&sql_request.sql);
                    if !outcome.valid {
                        results.push(QueryResult::failed(
                            &request,
                            &record.id,
                            &record.name,
                            outcome.reason.unwrap_or_else(|| "query rejected".to_string()),
                        ));
                        continue;
                    }
                }

                let result = self.execute_one(&request, record).await;
                if result.result.success {
                    if let Some(output_as) = request.chain().output_as.clone() {
                        let field = request
                            .chain()
                            .output_field
                            .clone()
                            .unwrap_or_else(|| output_as.clone());
                        match QueryPlanner::extract_output_value(&result.result.data, &field) {
                            Some(value) => bindings.bind(output_as, value),
                            None => warn!(
                                variable = %output_as,
                                field = %field,
                                "chained output produced no value"
                            ),
                        }
                    }
                }
                results.push(result);
            }
        }
        results
    }

    async fn execute_one(&self, request: &DataRequest, record: &ConnectionRecord) -> QueryResult {
        let source = match self.registry.resolve(record) {
            Ok(source) => source,
            Err(e) => {
                return QueryResult::failed(
                    request,
                    &record.id,
                    &record.name,
                    format!("connection not found: {}", sanitize_error(&e.to_string())),
                )
            }
        };

        let start = Instant::now();
        match source.execute(request).await {
            Ok(mut result) => {
                if result.execution_time_ms == 0 {
                    result.execution_time_ms = start.elapsed().as_millis() as u64;
                }
                info!(
                    connection = %record.name,
                    rows = result.row_count,
                    elapsed_ms = result.execution_time_ms,
                    "request executed"
                );
                QueryResult {
                    connection_id: record.id.clone(),
                    connection_name: record.name.clone(),
                    explanation: request.explanation().map(str::to_string),
                    result,
                }
            }
            Err(e) => {
                warn!(connection = %record.name, "request failed: {}", e);
                QueryResult::failed(
                    request,
                    &record.id,
                    &record.name,
                    format!("execution failed: {}", sanitize_error(&e.to_string())),
                )
            }
        }
    }
}

fn resolve_connection<'a>(
    request: &DataRequest,
    connections: &'a [ConnectionRecord],
) -> Option<&'a ConnectionRecord> {
    match &request.chain().source_id {
        Some(source_id) => connections.iter().find(|c| &c.id == source_id),
        None => connections.first(),
    }
}

lazy_static! {
    static ref URL_CREDS: Regex = Regex::new(r"://[^@/\s]+@").unwrap();
    static ref SECRET_PAIR: Regex =
        Regex::new(r"(?i)\b(password|passwd|pwd|token|secret|authorization)\s*=\s*\S+").unwrap();
}

/// Strip credentials and connection secrets from driver error text before it
/// enters a result envelope.
pub fn sanitize_error(message: &str) -> String {
    let message = URL_CREDS.replace_all(message, "://***@");
    SECRET_PAIR.replace_all(&message, "$1=***").to_string()
}
