//! Unified schema model for heterogeneous data sources.
//!
//! A `SourceSchema` is an immutable snapshot of one connection's queryable
//! structure: tables with columns and keys for relational engines, tool and
//! resource descriptors for protocol servers, collection descriptors for
//! document stores, and key-pattern descriptors for key-value stores.
//! Everything here is derived from live introspection, never hand-edited.

use crate::source::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A single result/sample row. `serde_json`'s map preserves insertion order,
/// so key order mirrors column order.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    /// Declared type as reported by the engine (e.g. "integer", "text").
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    pub primary_keys: Vec<String>,
}

impl TableSchema {
    /// First column with a numeric declared type, if any.
    pub fn first_numeric_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| is_numeric_type(&c.data_type))
    }

    /// First column with a date/time declared type, if any.
    pub fn first_temporal_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| is_temporal_type(&c.data_type))
    }
}

/// Heuristic over declared type names; covers the Postgres and SQLite
/// spellings we introspect.
pub fn is_numeric_type(data_type: &str) -> bool {
    let t = data_type.to_lowercase();
    ["int", "serial", "numeric", "decimal", "real", "double", "float", "money"]
        .iter()
        .any(|k| t.contains(k))
}

pub fn is_temporal_type(data_type: &str) -> bool {
    let t = data_type.to_lowercase();
    t.contains("date") || t.contains("time")
}

/// A callable tool exposed by a protocol server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's arguments, as advertised by the server.
    #[serde(default)]
    pub input_schema: Value,
}

/// A readable resource exposed by a protocol server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A document collection (index) in a document/search store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDescriptor {
    pub name: String,
    /// Field name -> declared mapping type.
    pub fields: HashMap<String, String>,
}

/// A key shape observed in a key-value store, e.g. `user:*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPatternDescriptor {
    pub pattern: String,
    pub sample_keys: Vec<String>,
}

/// Engine-specific payload of a schema snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SchemaData {
    Relational { tables: Vec<TableSchema> },
    Protocol {
        tools: Vec<ToolDescriptor>,
        resources: Vec<ResourceDescriptor>,
    },
    Document { collections: Vec<CollectionDescriptor> },
    KeyValue { patterns: Vec<KeyPatternDescriptor> },
}

impl SchemaData {
    pub fn tables(&self) -> &[TableSchema] {
        match self {
            SchemaData::Relational { tables } => tables,
            _ => &[],
        }
    }

    /// True when the snapshot carries nothing queryable.
    pub fn is_empty(&self) -> bool {
        match self {
            SchemaData::Relational { tables } => tables.is_empty(),
            SchemaData::Protocol { tools, resources } => tools.is_empty() && resources.is_empty(),
            SchemaData::Document { collections } => collections.is_empty(),
            SchemaData::KeyValue { patterns } => patterns.is_empty(),
        }
    }
}

/// Immutable schema snapshot for one connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSchema {
    pub source_id: String,
    pub source_name: String,
    pub source_type: SourceType,
    pub schema_data: SchemaData,
    /// Table/collection name -> bounded list of sample rows.
    #[serde(default)]
    pub sample_data: HashMap<String, Vec<Row>>,
    pub extracted_at: DateTime<Utc>,
}

impl SourceSchema {
    pub fn new(source_id: &str, source_name: &str, source_type: SourceType, schema_data: SchemaData) -> Self {
        Self {
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            source_type,
            schema_data,
            sample_data: HashMap::new(),
            extracted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_temporal_detection() {
        assert!(is_numeric_type("integer"));
        assert!(is_numeric_type("double precision"));
        assert!(is_numeric_type("NUMERIC(10,2)"));
        assert!(!is_numeric_type("text"));
        assert!(is_temporal_type("timestamp with time zone"));
        assert!(is_temporal_type("DATE"));
        assert!(!is_temporal_type("varchar"));
    }

    #[test]
    fn first_numeric_column_respects_order() {
        let table = TableSchema {
            name: "orders".to_string(),
            columns: vec![
                ColumnSchema {
                    name: "id".to_string(),
                    data_type: "text".to_string(),
                    nullable: false,
                    primary_key: true,
                },
                ColumnSchema {
                    name: "amount".to_string(),
                    data_type: "numeric".to_string(),
                    nullable: true,
                    primary_key: false,
                },
                ColumnSchema {
                    name: "quantity".to_string(),
                    data_type: "integer".to_string(),
                    nullable: true,
                    primary_key: false,
                },
            ],
            primary_keys: vec!["id".to_string()],
        };
        assert_eq!(table.first_numeric_column().map(|c| c.name.as_str()), Some("amount"));
    }
}
