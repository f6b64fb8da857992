//! Key-value store source over a Redis-compatible REST transport.
//!
//! The request union has no key-value-specific variant, so this source
//! interprets `SearchQuery` text as a key pattern: SCAN MATCH to find keys,
//! MGET to pull their values. Schema extraction samples keys and collapses
//! them into prefix patterns (`user:*`).

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::request::{columns_of, DataRequest, ExecutionResult};
use crate::schema::{KeyPatternDescriptor, Row, SchemaData, SourceSchema};
use crate::source::{ConnectionInfo, ConnectionRecord, DataSource, SourceType, reject_unsupported};
use async_trait::async_trait;
use itertools::Itertools;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

const SCAN_COUNT: usize = 200;

pub struct KeyValueSource {
    id: String,
    name: String,
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
    result_row_cap: usize,
}

impl KeyValueSource {
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
            result_row_cap: config.result_row_cap,
        })
    }

    /// Issue one Redis command as a JSON array, REST style.
    async fn command(&self, parts: &[&str]) -> Result<Value> {
        let mut request = self.client.post(&self.base_url).json(&parts);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response: Value = request.send().await?.error_for_status()?.json().await?;
        if let Some(err) = response.get("error").and_then(Value::as_str) {
            return Err(EngineError::Source(format!("key-value command failed: {}", err)));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn scan_keys(&self, pattern: &str, cap: usize) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor = "0".to_string();
        loop {
            let count = SCAN_COUNT.to_string();
            let reply = self
                .command(&["SCAN", &cursor, "MATCH", pattern, "COUNT", &count])
                .await?;
            let next = reply
                .get(0)
                .and_then(Value::as_str)
                .unwrap_or("0")
                .to_string();
            if let Some(batch) = reply.get(1).and_then(Value::as_array) {
                keys.extend(batch.iter().filter_map(Value::as_str).map(String::from));
            }
            if next == "0" || keys.len() >= cap {
                break;
            }
            cursor = next;
        }
        keys.truncate(cap);
        Ok(keys)
    }
}

#[async_trait]
impl DataSource for KeyValueSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::KeyValue
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            source_type: SourceType::KeyValue,
            url: self.base_url.clone(),
        }
    }

    fn accepts(&self, request: &DataRequest) -> bool {
        matches!(request, DataRequest::SearchQuery(_))
    }

    async fn extract_schema(&self) -> Result<SourceSchema> {
        let keys = self
            .scan_keys("*", SCAN_COUNT)
            .await
            .map_err(|e| EngineError::Schema(format!("key scan failed: {}", e)))?;

        // Group by prefix up to the first separator: "user:42" -> "user:*".
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for key in keys {
            let pattern = match key.split_once(':') {
                Some((prefix, _)) => format!("{}:*", prefix),
                None => key.clone(),
            };
            grouped.entry(pattern).or_default().push(key);
        }

        let patterns = grouped
            .into_iter()
            .map(|(pattern, mut sample_keys)| {
                sample_keys.truncate(5);
                KeyPatternDescriptor { pattern, sample_keys }
            })
            .collect();

        Ok(SourceSchema::new(
            &self.id,
            &self.name,
            SourceType::KeyValue,
            SchemaData::KeyValue { patterns },
        ))
    }

    async fn execute(&self, request: &DataRequest) -> Result<ExecutionResult> {
        reject_unsupported(self, request)?;
        let (pattern, limit) = match request {
            DataRequest::SearchQuery(r) => (
                r.query.as_str(),
                r.limit
                    .map(|l| l as usize)
                    .unwrap_or(self.result_row_cap)
                    .min(self.result_row_cap),
            ),
            _ => unreachable!("guarded by reject_unsupported"),
        };

        let start = Instant::now();
        let keys = self.scan_keys(pattern, limit).await?;
        let data: Vec<Row> = if keys.is_empty() {
            Vec::new()
        } else {
            let mut cmd: Vec<&str> = vec!["MGET"];
            cmd.extend(keys.iter().map(String::as_str));
            let values = self.command(&cmd).await?;
            let values = values.as_array().cloned().unwrap_or_default();
            keys.iter()
                .zip_longest(values)
                .map(|pair| {
                    let (key, value) = match pair {
                        itertools::EitherOrBoth::Both(k, v) => (k.clone(), v),
                        itertools::EitherOrBoth::Left(k) => (k.clone(), Value::Null),
                        itertools::EitherOrBoth::Right(v) => (String::new(), v),
                    };
                    let mut row = Row::new();
                    row.insert("key".to_string(), Value::String(key));
                    row.insert("value".to_string(), value);
                    row
                })
                .collect()
        };

        let columns = columns_of(&data);
        Ok(ExecutionResult::ok(
            data,
            columns,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn is_available(&self) -> bool {
        self.command(&["PING"]).await.is_ok()
    }
}
