//! Tool/resource protocol server source (JSON-RPC over HTTP).
//!
//! Capability discovery uses `tools/list` and `resources/list`; execution
//! maps `ToolCall` to `tools/call` and `ResourceRead` to `resources/read`.
//! All calls ride a bearer-token-authenticated transport.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::request::{columns_of, DataRequest, ExecutionResult};
use crate::schema::{ResourceDescriptor, Row, SchemaData, SourceSchema, ToolDescriptor};
use crate::source::{ConnectionInfo, ConnectionRecord, DataSource, SourceType, reject_unsupported};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::debug;

pub struct McpSource {
    id: String,
    name: String,
    endpoint: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl McpSource {
    pub fn new(record: &ConnectionRecord, config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.statement_timeout)
            .build()?;
        Ok(Self {
            id: record.id.clone(),
            name: record.name.clone(),
            endpoint: record.url.clone(),
            auth_token: record.auth_token.clone(),
            client,
        })
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": method,
            "params": params,
        });
        debug!(method, endpoint = %self.endpoint, "protocol server call");

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response: Value = request.send().await?.error_for_status()?.json().await?;

        if let Some(err) = response.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown protocol error");
            return Err(EngineError::Source(format!("{} failed: {}", method, message)));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl DataSource for McpSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Mcp
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            source_type: SourceType::Mcp,
            url: self.endpoint.clone(),
        }
    }

    fn accepts(&self, request: &DataRequest) -> bool {
        matches!(request, DataRequest::ToolCall(_) | DataRequest::ResourceRead(_))
    }

    async fn extract_schema(&self) -> Result<SourceSchema> {
        let tools_result = self
            .rpc("tools/list", json!({}))
            .await
            .map_err(|e| EngineError::Schema(format!("capability discovery failed: {}", e)))?;
        let tools: Vec<ToolDescriptor> = tools_result
            .get("tools")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        // Not every server exposes resources; an error here only empties
        // the resource list.
        let resources: Vec<ResourceDescriptor> = match self.rpc("resources/list", json!({})).await {
            Ok(result) => result
                .get("resources")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or_default(),
            Err(e) => {
                debug!("resources/list unavailable: {}", e);
                Vec::new()
            }
        };

        Ok(SourceSchema::new(
            &self.id,
            &self.name,
            SourceType::Mcp,
            SchemaData::Protocol { tools, resources },
        ))
    }

    async fn execute(&self, request: &DataRequest) -> Result<ExecutionResult> {
        reject_unsupported(self, request)?;
        let start = Instant::now();

        let result = match request {
            DataRequest::ToolCall(r) => {
                let arguments = if r.arguments.is_null() { json!({}) } else { r.arguments.clone() };
                self.rpc("tools/call", json!({ "name": r.tool_name, "arguments": arguments }))
                    .await?
            }
            DataRequest::ResourceRead(r) => {
                self.rpc("resources/read", json!({ "uri": r.uri })).await?
            }
            _ => unreachable!("guarded by reject_unsupported"),
        };

        let entries = result
            .get("content")
            .or_else(|| result.get("contents"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_else(|| vec![result]);
        let data: Vec<Row> = entries.into_iter().map(value_to_row).collect();
        let columns = columns_of(&data);
        Ok(ExecutionResult::ok(
            data,
            columns,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn is_available(&self) -> bool {
        self.rpc("tools/list", json!({})).await.is_ok()
    }
}

/// Protocol payload entries are objects already shaped like rows; anything
/// else is wrapped under a `value` key.
fn value_to_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => {
            let mut row = Row::new();
            row.insert("value".to_string(), other);
            row
        }
    }
}
