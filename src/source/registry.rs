//! Connection-record to data-source resolution.
//!
//! The one polymorphism seam: everything upstream works against
//! `Arc<dyn DataSource>` and never sees a concrete backend. Resolved sources
//! are cached by connection id so connection pools are reused across turns.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::source::elasticsearch::ElasticsearchSource;
use crate::source::keyvalue::KeyValueSource;
use crate::source::mcp::McpSource;
use crate::source::postgres::PostgresSource;
use crate::source::sqlite::SqliteSource;
use crate::source::{ConnectionRecord, DataSource, SourceType};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

pub struct SourceRegistry {
    config: EngineConfig,
    resolved: DashMap<String, Arc<dyn DataSource>>,
}

impl SourceRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            resolved: DashMap::new(),
        }
    }

    /// Resolve a stored connection record to its live source implementation.
    pub fn resolve(&self, record: &ConnectionRecord) -> Result<Arc<dyn DataSource>> {
        if let Some(existing) = self.resolved.get(&record.id) {
            return Ok(existing.clone());
        }

        debug!(id = %record.id, source_type = %record.source_type, "building data source");
        let source: Arc<dyn DataSource> = match record.source_type {
            SourceType::Postgres => Arc::new(PostgresSource::new(record, &self.config)?),
            SourceType::Sqlite => Arc::new(SqliteSource::new(record, &self.config)?),
            SourceType::Mcp => Arc::new(McpSource::new(record, &self.config)?),
            SourceType::Elasticsearch => Arc::new(ElasticsearchSource::new(record, &self.config)?),
            SourceType::KeyValue => Arc::new(KeyValueSource::new(record, &self.config)?),
        };
        self.resolved.insert(record.id.clone(), source.clone());
        Ok(source)
    }

    /// Register a pre-built source under its connection id. Used for tests
    /// and for embedding callers that manage their own backends.
    pub fn register(&self, source: Arc<dyn DataSource>) {
        self.resolved.insert(source.id().to_string(), source);
    }

    /// Drop a cached source, forcing the next resolve to rebuild it.
    pub fn evict(&self, connection_id: &str) {
        self.resolved.remove(connection_id);
    }
}
