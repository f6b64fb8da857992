//! Top-level turn orchestration.
//!
//! One user turn flows: schema extraction per connection (failing sources
//! are skipped) -> AI provider or heuristic generator -> plan ordering and
//! execution -> aggregated envelope. Unexpected internal errors are caught
//! at this boundary and converted into a terminal DIRECT_ANSWER; nothing
//! propagates past `process_message`.

use crate::ai::types::{AiResponse, ChatRequest, ExecutionPlan, Preferences};
use crate::ai::AiProvider;
use crate::config::EngineConfig;
use crate::conversation::ConversationManager;
use crate::error::Result;
use crate::executor::{ExecutionService, QueryResult};
use crate::extractor::{SchemaCache, SchemaExtractor};
use crate::generator::QueryGenerator;
use crate::intent::{suggest_visualization, QueryIntent, VisualizationHint};
use crate::request::{ChainSpec, DataRequest, SqlQueryRequest};
use crate::source::{ConnectionRecord, SourceRegistry};
use crate::trainer::SchemaTrainer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

/// Aggregated outcome of one user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub response: AiResponse,
    pub results: Vec<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationHint>,
}

pub struct Orchestrator {
    config: EngineConfig,
    registry: Arc<SourceRegistry>,
    schema_cache: SchemaCache,
    generator: QueryGenerator,
    provider: Option<Arc<dyn AiProvider>>,
    executor: ExecutionService,
    conversations: ConversationManager,
    trainer: Option<SchemaTrainer>,
}

impl Orchestrator {
    pub fn new(config: EngineConfig, provider: Option<Arc<dyn AiProvider>>) -> Self {
        let registry = Arc::new(SourceRegistry::new(config.clone()));
        Self {
            schema_cache: SchemaCache::new(SchemaExtractor::new(registry.clone())),
            generator: QueryGenerator::new(config.result_row_cap),
            executor: ExecutionService::new(registry.clone()),
            conversations: ConversationManager::new(config.conversation_ttl),
            trainer: SchemaTrainer::from_config(&config),
            provider,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn conversations(&self) -> &ConversationManager {
        &self.conversations
    }

    /// Process one user turn. Never returns an error: every failure mode
    /// resolves to a response object.
    pub async fn process_message(
        &self,
        conversation_id: &str,
        message: &str,
        connections: &[ConnectionRecord],
    ) -> TurnOutcome {
        match self.process_inner(conversation_id, message, connections, None).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("turn failed: {}", e);
                TurnOutcome {
                    response: AiResponse::direct_answer(
                        "Something went wrong while processing your request. Please try again.",
                    ),
                    results: Vec::new(),
                    visualization: None,
                }
            }
        }
    }

    /// Streaming variant: AI text deltas are forwarded through `chunks` as
    /// they arrive. Heuristic-fallback turns produce no deltas.
    pub async fn process_message_streaming(
        &self,
        conversation_id: &str,
        message: &str,
        connections: &[ConnectionRecord],
        chunks: UnboundedSender<String>,
    ) -> TurnOutcome {
        match self
            .process_inner(conversation_id, message, connections, Some(chunks))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("turn failed: {}", e);
                TurnOutcome {
                    response: AiResponse::direct_answer(
                        "Something went wrong while processing your request. Please try again.",
                    ),
                    results: Vec::new(),
                    visualization: None,
                }
            }
        }
    }

    async fn process_inner(
        &self,
        conversation_id: &str,
        message: &str,
        connections: &[ConnectionRecord],
        chunks: Option<UnboundedSender<String>>,
    ) -> Result<TurnOutcome> {
        self.conversations.add_user_message(conversation_id, message);

        let schemas = self.schema_cache.get_or_extract_all(connections).await;
        if schemas.is_empty() {
            // Every source failed: terminal error for this turn.
            let response = AiResponse::direct_answer(
                "No schemas could be extracted from the configured connections, so the \
                 question cannot be answered against your data.",
            );
            self.conversations.update_state(conversation_id, &response);
            return Ok(TurnOutcome { response, results: Vec::new(), visualization: None });
        }

        if let Some(trainer) = &self.trainer {
            for schema in &schemas {
                trainer.push_schema(schema).await;
            }
        }

        let response = match &self.provider {
            Some(provider) if provider.is_configured() => {
                let request = ChatRequest {
                    user_message: message.to_string(),
                    schemas: schemas.clone(),
                    history: self.conversations.history(conversation_id),
                    preferences: Some(Preferences::default()),
                };
                match chunks {
                    Some(chunks) => provider.stream_chat(&request, chunks).await?,
                    None => provider.chat(&request).await?,
                }
            }
            _ => self.heuristic_response(message, &schemas),
        };

        self.conversations.update_state(conversation_id, &response);

        let results = match &response {
            AiResponse::ReadyToExecute(plan) if !plan.data_requests.is_empty() => {
                self.executor
                    .execute_all(plan.data_requests.clone(), connections)
                    .await
            }
            _ => Vec::new(),
        };

        let visualization = self.pick_visualization(message, &response, &results);
        info!(
            conversation = %conversation_id,
            response_type = response.response_type(),
            requests = response.data_requests().len(),
            results = results.len(),
            "turn complete"
        );
        Ok(TurnOutcome { response, results, visualization })
    }

    /// Rule-based fallback when no AI provider is configured: synthesize
    /// validated SQL from the schemas and wrap it as an execution plan.
    fn heuristic_response(&self, message: &str, schemas: &[crate::schema::SourceSchema]) -> AiResponse {
        let set = self.generator.generate(message, schemas);
        let mut data_requests = Vec::new();
        let mut skipped = Vec::new();

        for query in &set.queries {
            match &query.sql {
                Some(sql) => data_requests.push(DataRequest::Sql(SqlQueryRequest {
                    sql: sql.clone(),
                    chain: ChainSpec {
                        source_id: Some(query.connection_id.clone()),
                        explanation: Some(query.explanation.clone()),
                        ..ChainSpec::default()
                    },
                })),
                None => skipped.push(format!(
                    "{}: {}",
                    query.table,
                    query.validation_error.as_deref().unwrap_or("rejected")
                )),
            }
        }

        if data_requests.is_empty() {
            let detail = if skipped.is_empty() {
                "no relational tables matched the question".to_string()
            } else {
                skipped.join("; ")
            };
            return AiResponse::direct_answer(format!(
                "No safe query could be generated for this question ({}).",
                detail
            ));
        }

        let mut content = format!("Generated {} query(ies) heuristically.", data_requests.len());
        if !skipped.is_empty() {
            content.push_str(&format!(" Skipped: {}.", skipped.join("; ")));
        }
        AiResponse::ReadyToExecute(ExecutionPlan {
            content,
            intent: Some(set.intent.to_string()),
            data_requests,
        })
    }

    fn pick_visualization(
        &self,
        message: &str,
        response: &AiResponse,
        results: &[QueryResult],
    ) -> Option<VisualizationHint> {
        let first_success = results.iter().find(|r| r.result.success)?;
        let intent = response
            .intent()
            .and_then(|i| i.parse::<QueryIntent>().ok())
            .unwrap_or_else(|| crate::intent::classify_intent(message));
        Some(suggest_visualization(intent, first_success.result.row_count))
    }

    /// Drop cached schema and pooled source for a removed connection, and
    /// its conversation-independent state.
    pub fn forget_connection(&self, connection_id: &str) {
        self.schema_cache.invalidate(connection_id);
        self.registry.evict(connection_id);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
