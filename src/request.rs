//! Tagged data requests and the uniform execution result envelope.
//!
//! `DataRequest` is the closed union of everything the engine can run
//! against a source. The `requestType` discriminator is exhaustive: an
//! unknown value is a hard deserialization error, not a silently dropped
//! entry.

use crate::schema::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chaining fields shared by every request variant.
///
/// `step` orders execution; `depends_on` must reference a strictly earlier
/// step; `output_as`/`output_field` bind one column of this request's result
/// to a `$variable` usable by later steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_as: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlQueryRequest {
    pub sql: String,
    #[serde(flatten)]
    pub chain: ChainSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(flatten)]
    pub chain: ChainSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReadRequest {
    pub uri: String,
    #[serde(flatten)]
    pub chain: ChainSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQueryRequest {
    pub collection: String,
    /// Engine-native filter document; `None` means match-all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(flatten)]
    pub chain: ChainSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(flatten)]
    pub chain: ChainSpec,
}

/// One executable request, tagged by `requestType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "requestType")]
pub enum DataRequest {
    #[serde(rename = "SQL_QUERY")]
    Sql(SqlQueryRequest),
    #[serde(rename = "TOOL_CALL")]
    ToolCall(ToolCallRequest),
    #[serde(rename = "RESOURCE_READ")]
    ResourceRead(ResourceReadRequest),
    #[serde(rename = "DOCUMENT_QUERY")]
    DocumentQuery(DocumentQueryRequest),
    #[serde(rename = "SEARCH_QUERY")]
    SearchQuery(SearchQueryRequest),
}

impl DataRequest {
    pub fn chain(&self) -> &ChainSpec {
        match self {
            DataRequest::Sql(r) => &r.chain,
            DataRequest::ToolCall(r) => &r.chain,
            DataRequest::ResourceRead(r) => &r.chain,
            DataRequest::DocumentQuery(r) => &r.chain,
            DataRequest::SearchQuery(r) => &r.chain,
        }
    }

    pub fn chain_mut(&mut self) -> &mut ChainSpec {
        match self {
            DataRequest::Sql(r) => &mut r.chain,
            DataRequest::ToolCall(r) => &mut r.chain,
            DataRequest::ResourceRead(r) => &mut r.chain,
            DataRequest::DocumentQuery(r) => &mut r.chain,
            DataRequest::SearchQuery(r) => &mut r.chain,
        }
    }

    /// Execution order; unnumbered requests run in the first step.
    pub fn step(&self) -> u32 {
        self.chain().step.unwrap_or(1)
    }

    pub fn has_dependency(&self) -> bool {
        self.chain().depends_on.is_some()
    }

    pub fn explanation(&self) -> Option<&str> {
        self.chain().explanation.as_deref()
    }

    /// Mutable access to the free-text query, for variable substitution.
    /// Tool calls and resource reads carry structured arguments instead.
    pub fn query_text_mut(&mut self) -> Option<&mut String> {
        match self {
            DataRequest::Sql(r) => Some(&mut r.sql),
            DataRequest::SearchQuery(r) => Some(&mut r.query),
            _ => None,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            DataRequest::Sql(_) => "SQL_QUERY",
            DataRequest::ToolCall(_) => "TOOL_CALL",
            DataRequest::ResourceRead(_) => "RESOURCE_READ",
            DataRequest::DocumentQuery(_) => "DOCUMENT_QUERY",
            DataRequest::SearchQuery(_) => "SEARCH_QUERY",
        }
    }
}

/// Uniform result of executing one request. Immutable once produced;
/// `success == false` implies `data` is empty and `error_message` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Vec<Row>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionResult {
    pub fn ok(data: Vec<Row>, columns: Vec<String>, execution_time_ms: u64) -> Self {
        let row_count = data.len();
        Self {
            success: true,
            data,
            columns,
            row_count,
            execution_time_ms,
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
            execution_time_ms: 0,
            error_message: Some(message.into()),
        }
    }
}

/// Column order of a row set: the first row's key order.
pub fn columns_of(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default()
}
