#![allow(dead_code)]

use async_trait::async_trait;
use querymesh::request::{columns_of, DataRequest, ExecutionResult};
use querymesh::schema::{ColumnSchema, Row, SchemaData, SourceSchema, TableSchema};
use querymesh::source::{reject_unsupported, ConnectionInfo, ConnectionRecord, DataSource, SourceType};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn connection(id: &str) -> ConnectionRecord {
    ConnectionRecord {
        id: id.to_string(),
        name: format!("{} (test)", id),
        source_type: SourceType::Sqlite,
        url: "sqlite::memory:".to_string(),
        auth_token: None,
    }
}

pub fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    let mut r = Row::new();
    for (k, v) in pairs {
        r.insert(k.to_string(), v.clone());
    }
    r
}

/// In-memory relational source that records every executed query and serves
/// queued canned responses. Backend calls are counted so tests can assert a
/// rejected query never reached the source.
pub struct RecordingSource {
    id: String,
    name: String,
    calls: AtomicUsize,
    executed: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<Vec<Row>>>,
}

impl RecordingSource {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            name: format!("{} (test)", id),
            calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        })
    }

    /// Queue the row set returned by the next `execute` call.
    pub fn push_response(&self, rows: Vec<Row>) {
        self.responses.lock().unwrap().push_back(rows);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries that reached the backend, in execution order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSource for RecordingSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Sqlite
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            source_type: SourceType::Sqlite,
            url: "sqlite::memory:".to_string(),
        }
    }

    fn accepts(&self, request: &DataRequest) -> bool {
        matches!(request, DataRequest::Sql(_))
    }

    async fn extract_schema(&self) -> querymesh::Result<SourceSchema> {
        let users = TableSchema {
            name: "users".to_string(),
            columns: vec![
                ColumnSchema {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
                    nullable: false,
                    primary_key: true,
                },
                ColumnSchema {
                    name: "name".to_string(),
                    data_type: "text".to_string(),
                    nullable: true,
                    primary_key: false,
                },
                ColumnSchema {
                    name: "created_at".to_string(),
                    data_type: "timestamp".to_string(),
                    nullable: true,
                    primary_key: false,
                },
            ],
            primary_keys: vec!["id".to_string()],
        };
        let mut schema = SourceSchema::new(
            &self.id,
            &self.name,
            SourceType::Sqlite,
            SchemaData::Relational { tables: vec![users] },
        );
        schema.sample_data.insert(
            "users".to_string(),
            vec![row(&[("id", json!(1)), ("name", json!("ada"))])],
        );
        Ok(schema)
    }

    async fn execute(&self, request: &DataRequest) -> querymesh::Result<ExecutionResult> {
        reject_unsupported(self, request)?;
        let DataRequest::Sql(sql) = request else { unreachable!() };
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.executed.lock().unwrap().push(sql.sql.clone());
        let data = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![row(&[("total_count", json!(3))])]);
        let columns = columns_of(&data);
        Ok(ExecutionResult::ok(data, columns, 1))
    }

    async fn is_available(&self) -> bool {
        true
    }
}
