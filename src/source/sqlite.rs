//! Embedded SQLite data source backed by rusqlite.
//!
//! The connection is local and queries are short, so calls run on the
//! current thread behind a mutex; no guard is held across an await point.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::request::{columns_of, DataRequest, ExecutionResult};
use crate::safety::QueryValidator;
use crate::schema::{ColumnSchema, Row, SchemaData, SourceSchema, TableSchema};
use crate::source::{
    reject_unsupported, ConnectionInfo, ConnectionRecord, DataSource, SourceType,
};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Instant;

/// Hard ceiling on rows returned by a single statement, independent of any
/// LIMIT the query itself carries.
const MAX_RESULT_ROWS: usize = 10_000;

pub struct SqliteSource {
    id: String,
    name: String,
    path: String,
    conn: Mutex<Connection>,
    sample_row_cap: usize,
}

impl SqliteSource {
    pub fn new(record: &ConnectionRecord, config: &EngineConfig) -> Result<Self> {
        let path = record
            .url
            .strip_prefix("sqlite://")
            .unwrap_or(&record.url)
            .to_string();
        let conn = Connection::open(&path)?;
        Ok(Self {
            id: record.id.clone(),
            name: record.name.clone(),
            path,
            conn: Mutex::new(conn),
            sample_row_cap: config.sample_row_cap,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Source("sqlite connection poisoned".to_string()))
    }

    fn run_select(&self, sql: &str) -> Result<(Vec<Row>, Vec<String>)> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query([])?;
        let mut data = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (i, col) in columns.iter().enumerate() {
                map.insert(col.clone(), sqlite_value_to_json(row.get_ref(i)?));
            }
            data.push(map);
            if data.len() >= MAX_RESULT_ROWS {
                break;
            }
        }
        Ok((data, columns))
    }
}

#[async_trait]
impl DataSource for SqliteSource {
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
            url: format!("sqlite://{}", self.path),
        }
    }

    fn accepts(&self, request: &DataRequest) -> bool {
        matches!(request, DataRequest::Sql(_))
    }

    async fn extract_schema(&self) -> Result<SourceSchema> {
        let table_names: Vec<String> = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )
                .map_err(|e| EngineError::Schema(format!("sqlite introspection failed: {}", e)))?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            names
        };

        let mut schema = SourceSchema::new(
            &self.id,
            &self.name,
            SourceType::Sqlite,
            SchemaData::Relational { tables: Vec::new() },
        );
        let mut tables = Vec::with_capacity(table_names.len());

        for table in &table_names {
            let columns: Vec<ColumnSchema> = {
                let conn = self.lock()?;
                let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
                let cols = stmt
                    .query_map([], |row| {
                        let name: String = row.get(1)?;
                        let data_type: String = row.get(2)?;
                        let not_null: i64 = row.get(3)?;
                        let pk: i64 = row.get(5)?;
                        Ok(ColumnSchema {
                            name,
                            data_type,
                            nullable: not_null == 0,
                            primary_key: pk > 0,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                cols
            };
            let primary_keys = columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| c.name.clone())
                .collect();
            tables.push(TableSchema {
                name: table.clone(),
                columns,
                primary_keys,
            });

            let sample_sql = format!("SELECT * FROM \"{}\" LIMIT {}", table, self.sample_row_cap);
            if let Ok((rows, _)) = self.run_select(&sample_sql) {
                schema.sample_data.insert(table.clone(), rows);
            }
        }

        schema.schema_data = SchemaData::Relational { tables };
        Ok(schema)
    }

    async fn execute(&self, request: &DataRequest) -> Result<ExecutionResult> {
        reject_unsupported(self, request)?;
        let sql = match request {
            DataRequest::Sql(r) => &r.sql,
            _ => unreachable!("guarded by reject_unsupported"),
        };

        let outcome = QueryValidator::validate(sql);
        if !outcome.valid {
            return Err(EngineError::Validation(
                outcome.reason.unwrap_or_else(|| "query rejected".to_string()),
            ));
        }

        let start = Instant::now();
        let (data, mut columns) = self.run_select(sql)?;
        if columns.is_empty() {
            columns = columns_of(&data);
        }
        Ok(ExecutionResult::ok(
            data,
            columns,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn is_available(&self) -> bool {
        self.lock()
            .and_then(|conn| {
                conn.query_row("SELECT 1", [], |_| Ok(()))
                    .map_err(EngineError::from)
            })
            .is_ok()
    }
}

fn sqlite_value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ChainSpec, SqlQueryRequest};

    fn memory_source() -> SqliteSource {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT); \
             INSERT INTO users (name, city) VALUES ('ada', 'london'), ('grace', 'new york');",
        )
        .unwrap();
        SqliteSource {
            id: "test-db".to_string(),
            name: "test".to_string(),
            path: ":memory:".to_string(),
            conn: Mutex::new(conn),
            sample_row_cap: 5,
        }
    }

    fn sql_request(sql: &str) -> DataRequest {
        DataRequest::Sql(SqlQueryRequest {
            sql: sql.to_string(),
            chain: ChainSpec::default(),
        })
    }

    #[tokio::test]
    async fn extracts_tables_columns_and_samples() {
        let source = memory_source();
        let schema = source.extract_schema().await.unwrap();
        let tables = schema.schema_data.tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "users");
        assert_eq!(tables[0].primary_keys, vec!["id"]);
        let name_col = tables[0].columns.iter().find(|c| c.name == "name").unwrap();
        assert!(!name_col.nullable);
        assert_eq!(schema.sample_data["users"].len(), 2);
    }

    #[tokio::test]
    async fn executes_select_and_preserves_column_order() {
        let source = memory_source();
        let result = source
            .execute(&sql_request("SELECT name, id FROM users ORDER BY id"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.columns, vec!["name", "id"]);
        assert_eq!(result.data[0]["name"], Value::String("ada".to_string()));
    }

    #[tokio::test]
    async fn rejects_mutation_before_touching_the_database() {
        let source = memory_source();
        let err = source
            .execute(&sql_request("DELETE FROM users"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("DELETE"));
        // Table contents are untouched.
        let result = source
            .execute(&sql_request("SELECT COUNT(*) AS n FROM users"))
            .await
            .unwrap();
        assert_eq!(result.data[0]["n"], Value::from(2));
    }

    #[tokio::test]
    async fn rejects_unsupported_variant() {
        let source = memory_source();
        let req = DataRequest::SearchQuery(crate::request::SearchQueryRequest {
            query: "anything".to_string(),
            index: None,
            limit: None,
            chain: ChainSpec::default(),
        });
        let err = source.execute(&req).await.unwrap_err();
        assert!(err.to_string().contains("SEARCH_QUERY"));
    }
}
