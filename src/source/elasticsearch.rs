//! Document store / search index source over the Elasticsearch REST API.
//!
//! One backend serves two request variants: `DocumentQuery` (engine-native
//! filter documents) and `SearchQuery` (free-text query-string search).

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::request::{columns_of, DataRequest, ExecutionResult};
use crate::schema::{CollectionDescriptor, Row, SchemaData, SourceSchema};
use crate::source::{ConnectionInfo, ConnectionRecord, DataSource, SourceType, reject_unsupported};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

pub struct ElasticsearchSource {
    id: String,
    name: String,
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
    sample_row_cap: usize,
    result_row_cap: usize,
}

impl ElasticsearchSource {
    pub fn new(record: &ConnectionRecord, config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.statement_timeout)
            .build()?;
        Ok(Self {
            id: record.id.clone(),
            name: record.name.clone(),
            base_url: record.url.trim_end_matches('/').to_string(),
            auth_token: record.auth_token.clone(),
            client,
            sample_row_cap: config.sample_row_cap,
            result_row_cap: config.result_row_cap,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.authorize(self.client.get(&url)).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    async fn search(&self, index: &str, body: Value) -> Result<Vec<Row>> {
        let url = format!("{}/{}/_search", self.base_url, index);
        let response: Value = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let hits = response
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut row = Row::new();
                if let Some(id) = hit.get("_id").and_then(Value::as_str) {
                    row.insert("_id".to_string(), Value::String(id.to_string()));
                }
                if let Some(Value::Object(source)) = hit.get("_source").cloned() {
                    for (k, v) in source {
                        row.insert(k, v);
                    }
                }
                row
            })
            .collect())
    }

    fn capped_limit(&self, requested: Option<u32>) -> usize {
        requested
            .map(|l| l as usize)
            .unwrap_or(self.result_row_cap)
            .min(self.result_row_cap)
    }
}

#[async_trait]
impl DataSource for ElasticsearchSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Elasticsearch
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            source_type: SourceType::Elasticsearch,
            url: self.base_url.clone(),
        }
    }

    fn accepts(&self, request: &DataRequest) -> bool {
        matches!(request, DataRequest::DocumentQuery(_) | DataRequest::SearchQuery(_))
    }

    async fn extract_schema(&self) -> Result<SourceSchema> {
        let mappings = self
            .get_json("_mapping")
            .await
            .map_err(|e| EngineError::Schema(format!("mapping discovery failed: {}", e)))?;

        let mut schema = SourceSchema::new(
            &self.id,
            &self.name,
            SourceType::Elasticsearch,
            SchemaData::Document { collections: Vec::new() },
        );
        let mut collections = Vec::new();

        if let Value::Object(indices) = mappings {
            for (index, mapping) in indices {
                // Dot-prefixed indices are internal to the engine.
                if index.starts_with('.') {
                    continue;
                }
                let mut fields = HashMap::new();
                if let Some(Value::Object(properties)) =
                    mapping.pointer("/mappings/properties").cloned()
                {
                    for (field, spec) in properties {
                        let field_type = spec
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("object")
                            .to_string();
                        fields.insert(field, field_type);
                    }
                }

                match self
                    .search(&index, json!({ "size": self.sample_row_cap }))
                    .await
                {
                    Ok(rows) => {
                        schema.sample_data.insert(index.clone(), rows);
                    }
                    Err(e) => debug!(index = %index, "sample fetch failed: {}", e),
                }
                collections.push(CollectionDescriptor { name: index, fields });
            }
        }

        collections.sort_by(|a, b| a.name.cmp(&b.name));
        schema.schema_data = SchemaData::Document { collections };
        Ok(schema)
    }

    async fn execute(&self, request: &DataRequest) -> Result<ExecutionResult> {
        reject_unsupported(self, request)?;
        let start = Instant::now();

        let data = match request {
            DataRequest::DocumentQuery(r) => {
                let query = r.filter.clone().unwrap_or_else(|| json!({ "match_all": {} }));
                let body = json!({ "query": query, "size": self.capped_limit(r.limit) });
                self.search(&r.collection, body).await?
            }
            DataRequest::SearchQuery(r) => {
                let index = r.index.as_deref().unwrap_or("_all");
                let body = json!({
                    "query": { "query_string": { "query": r.query } },
                    "size": self.capped_limit(r.limit),
                });
                self.search(index, body).await?
            }
            _ => unreachable!("guarded by reject_unsupported"),
        };

        let columns = columns_of(&data);
        Ok(ExecutionResult::ok(
            data,
            columns,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn is_available(&self) -> bool {
        self.get_json("_cluster/health").await.is_ok()
    }
}
