//! Source schema extraction and the collaborator-level schema cache.
//!
//! The extractor itself does no caching: it resolves the connection through
//! the registry and asks the source to describe itself. A connectivity
//! failure is a source-level error; callers skip the source and continue
//! with the rest. `SchemaCache` wraps the extractor with snapshot reuse and
//! explicit refresh/invalidate operations.

use crate::error::{EngineError, Result};
use crate::schema::SourceSchema;
use crate::source::{ConnectionRecord, SourceRegistry};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct SchemaExtractor {
    registry: Arc<SourceRegistry>,
}

impl SchemaExtractor {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self { registry }
    }

    /// Extract one connection's schema snapshot.
    pub async fn extract(&self, record: &ConnectionRecord) -> Result<SourceSchema> {
        let source = self
            .registry
            .resolve(record)
            .map_err(|e| EngineError::Schema(format!("cannot open source '{}': {}", record.name, e)))?;
        let schema = source.extract_schema().await?;
        info!(
            source = %record.name,
            source_type = %record.source_type,
            "extracted schema snapshot"
        );
        Ok(schema)
    }

    /// Extract all connections, skipping sources that fail. Returns the
    /// successful snapshots; an empty result means every source failed.
    pub async fn extract_all(&self, records: &[ConnectionRecord]) -> Vec<SourceSchema> {
        let mut schemas = Vec::with_capacity(records.len());
        for record in records {
            match self.extract(record).await {
                Ok(schema) => schemas.push(schema),
                Err(e) => {
                    warn!(source = %record.name, "skipping source, schema extraction failed: {}", e);
                }
            }
        }
        schemas
    }
}

/// Snapshot cache keyed by connection id. Extraction stays out of the
/// extractor proper so cached and fresh paths share the same code.
pub struct SchemaCache {
    extractor: SchemaExtractor,
    snapshots: DashMap<String, SourceSchema>,
}

impl SchemaCache {
    pub fn new(extractor: SchemaExtractor) -> Self {
        Self {
            extractor,
            snapshots: DashMap::new(),
        }
    }

    pub async fn get_or_extract(&self, record: &ConnectionRecord) -> Result<SourceSchema> {
        if let Some(snapshot) = self.snapshots.get(&record.id) {
            return Ok(snapshot.clone());
        }
        let schema = self.extractor.extract(record).await?;
        self.snapshots.insert(record.id.clone(), schema.clone());
        Ok(schema)
    }

    /// Like `extract_all`, but served from cache where possible.
    pub async fn get_or_extract_all(&self, records: &[ConnectionRecord]) -> Vec<SourceSchema> {
        let mut schemas = Vec::with_capacity(records.len());
        for record in records {
            match self.get_or_extract(record).await {
                Ok(schema) => schemas.push(schema),
                Err(e) => {
                    warn!(source = %record.name, "skipping source, schema extraction failed: {}", e);
                }
            }
        }
        schemas
    }

    /// Force a fresh snapshot for one connection.
    pub async fn refresh(&self, record: &ConnectionRecord) -> Result<SourceSchema> {
        self.snapshots.remove(&record.id);
        self.get_or_extract(record).await
    }

    pub fn invalidate(&self, connection_id: &str) {
        self.snapshots.remove(connection_id);
    }
}
