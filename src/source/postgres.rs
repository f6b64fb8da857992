//! PostgreSQL data source backed by sqlx.
//!
//! Execution always happens inside a transaction that is rolled back, never
//! committed, so even a validator bypass cannot leave a side effect behind.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::request::{columns_of, DataRequest, ExecutionResult};
use crate::safety::QueryValidator;
use crate::schema::{ColumnSchema, Row, SchemaData, SourceSchema, TableSchema};
use crate::source::{
    redact_url, reject_unsupported, ConnectionInfo, ConnectionRecord, DataSource, SourceType,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row as SqlxRow, TypeInfo};
use std::time::Instant;
use tracing::debug;

pub struct PostgresSource {
    id: String,
    name: String,
    url: String,
    pool: PgPool,
    sample_row_cap: usize,
    statement_timeout_ms: u64,
}

impl PostgresSource {
    pub fn new(record: &ConnectionRecord, config: &EngineConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(config.connect_timeout)
            .connect_lazy(&record.url)?;
        Ok(Self {
            id: record.id.clone(),
            name: record.name.clone(),
            url: record.url.clone(),
            pool,
            sample_row_cap: config.sample_row_cap,
            statement_timeout_ms: config.statement_timeout.as_millis() as u64,
        })
    }

    /// Base tables as (schema, name) pairs. Every introspection query below
    /// filters on both, so a name shared by two schemas never merges.
    async fn list_tables(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query_as::<_, (String, String)>(LIST_TABLES_SQL)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn table_schema(&self, schema: &str, table: &str) -> Result<TableSchema> {
        let pk_columns: Vec<String> = sqlx::query_scalar(PRIMARY_KEYS_SQL)
            .bind(table)
            .bind(schema)
            .fetch_all(&self.pool)
            .await?;

        let raw: Vec<(String, String, String)> = sqlx::query_as(COLUMNS_SQL)
            .bind(table)
            .bind(schema)
            .fetch_all(&self.pool)
            .await?;

        let columns = raw
            .into_iter()
            .map(|(name, data_type, is_nullable)| ColumnSchema {
                primary_key: pk_columns.contains(&name),
                nullable: is_nullable.eq_ignore_ascii_case("yes"),
                name,
                data_type,
            })
            .collect();

        Ok(TableSchema {
            name: table.to_string(),
            columns,
            primary_keys: pk_columns,
        })
    }

    async fn sample_rows(&self, schema: &str, table: &str) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            qualified_table(schema, table),
            self.sample_row_cap
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(pg_row_to_json).collect())
    }
}

// System/catalog schemas and pg_-prefixed names are excluded.
const LIST_TABLES_SQL: &str = "SELECT table_schema, table_name \
     FROM information_schema.tables \
     WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
       AND table_type = 'BASE TABLE' \
       AND table_name NOT LIKE 'pg\\_%' \
     ORDER BY table_schema, table_name";

const PRIMARY_KEYS_SQL: &str = "SELECT kcu.column_name \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
       ON tc.constraint_name = kcu.constraint_name \
      AND tc.table_schema = kcu.table_schema \
     WHERE tc.constraint_type = 'PRIMARY KEY' \
       AND tc.table_name = $1 AND tc.table_schema = $2";

const COLUMNS_SQL: &str = "SELECT column_name, data_type, is_nullable \
     FROM information_schema.columns \
     WHERE table_name = $1 AND table_schema = $2 \
     ORDER BY ordinal_position";

/// Quote a schema-qualified relation for interpolation into a sample query.
fn qualified_table(schema: &str, table: &str) -> String {
    format!(
        "\"{}\".\"{}\"",
        schema.replace('"', "\"\""),
        table.replace('"', "\"\"")
    )
}

/// Tables in `public` keep their bare name; anything else is shown
/// schema-qualified so same-named tables stay distinguishable.
fn display_name(schema: &str, table: &str) -> String {
    if schema == "public" {
        table.to_string()
    } else {
        format!("{}.{}", schema, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn introspection_filters_on_schema_and_name() {
        // A table name shared by two schemas must never merge.
        assert!(PRIMARY_KEYS_SQL.contains("tc.table_name = $1 AND tc.table_schema = $2"));
        assert!(COLUMNS_SQL.contains("table_name = $1 AND table_schema = $2"));
        assert!(LIST_TABLES_SQL.starts_with("SELECT table_schema, table_name"));
    }

    #[test]
    fn sample_queries_are_schema_qualified_and_quoted() {
        assert_eq!(qualified_table("app", "users"), "\"app\".\"users\"");
        assert_eq!(qualified_table("odd\"schema", "t"), "\"odd\"\"schema\".\"t\"");
    }

    #[test]
    fn only_non_public_tables_display_qualified() {
        assert_eq!(display_name("public", "users"), "users");
        assert_eq!(display_name("app", "users"), "app.users");
    }
}

#[async_trait]
impl DataSource for PostgresSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Postgres
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            source_type: SourceType::Postgres,
            url: redact_url(&self.url),
        }
    }

    fn accepts(&self, request: &DataRequest) -> bool {
        matches!(request, DataRequest::Sql(_))
    }

    async fn extract_schema(&self) -> Result<SourceSchema> {
        let table_names = self
            .list_tables()
            .await
            .map_err(|e| EngineError::Schema(format!("postgres introspection failed: {}", e)))?;

        let mut tables = Vec::with_capacity(table_names.len());
        let mut schema = SourceSchema::new(
            &self.id,
            &self.name,
            SourceType::Postgres,
            SchemaData::Relational { tables: Vec::new() },
        );

        for (table_schema, table) in &table_names {
            let mut described = self.table_schema(table_schema, table).await?;
            described.name = display_name(table_schema, table);
            match self.sample_rows(table_schema, table).await {
                Ok(rows) => {
                    schema.sample_data.insert(described.name.clone(), rows);
                }
                Err(e) => debug!(table = %described.name, "sample rows unavailable: {}", e),
            }
            tables.push(described);
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
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;
        let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
        // Read-only by contract: the transaction is always rolled back.
        tx.rollback().await?;

        let data: Vec<Row> = rows.iter().map(pg_row_to_json).collect();
        let columns = columns_of(&data);
        Ok(ExecutionResult::ok(
            data,
            columns,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn is_available(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

/// Decode a dynamically-typed Postgres row into an ordered JSON map.
fn pg_row_to_json(row: &PgRow) -> Row {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOL" => row
                .try_get::<Option<bool>, _>(i)
                .ok()
                .flatten()
                .map(Value::Bool),
            "INT2" => row
                .try_get::<Option<i16>, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::from(v as i64)),
            "INT4" => row
                .try_get::<Option<i32>, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::from(v as i64)),
            "INT8" => row.try_get::<Option<i64>, _>(i).ok().flatten().map(Value::from),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::from(v as f64)),
            "FLOAT8" => row.try_get::<Option<f64>, _>(i).ok().flatten().map(Value::from),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(Value::String),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_string())),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i).ok().flatten(),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_string())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_rfc3339())),
            // NUMERIC and anything exotic: fall back to text, then null.
            _ => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(Value::String),
        };
        out.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    out
}
