//! Best-effort schema push to an external model-context service.
//!
//! One POST per table. Non-2xx responses are logged and swallowed; nothing
//! on this path may fail the caller's request.

use crate::config::EngineConfig;
use crate::schema::SourceSchema;
use serde_json::json;
use tracing::{debug, warn};

pub struct SchemaTrainer {
    endpoint: String,
    client: reqwest::Client,
}

impl SchemaTrainer {
    /// Returns `None` when no training endpoint is configured.
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        if config.training_endpoint.is_empty() {
            return None;
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.statement_timeout)
            .build()
            .ok()?;
        Some(Self {
            endpoint: config.training_endpoint.clone(),
            client,
        })
    }

    /// Push every table of the snapshot. Errors never propagate.
    pub async fn push_schema(&self, schema: &SourceSchema) {
        for table in schema.schema_data.tables() {
            let payload = json!({
                "connectionId": schema.source_id,
                "tableName": table.name,
                "description": format!("Table {} from source {}", table.name, schema.source_name),
                "columns": table.columns.iter().map(|c| json!({
                    "name": c.name,
                    "type": c.data_type,
                    "description": if c.primary_key { "primary key" } else { "" },
                })).collect::<Vec<_>>(),
            });

            match self.client.post(&self.endpoint).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(table = %table.name, "schema training push accepted");
                }
                Ok(response) => {
                    warn!(
                        table = %table.name,
                        status = %response.status(),
                        "schema training push rejected"
                    );
                }
                Err(e) => {
                    warn!(table = %table.name, "schema training push failed: {}", e);
                }
            }
        }
    }
}
