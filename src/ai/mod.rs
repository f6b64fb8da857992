//! AI provider abstraction.
//!
//! Every backend exposes the same contract: a plain `chat` returning the
//! structured response, and a `stream_chat` that forwards text deltas
//! through a channel while building the same response. Provider failures
//! and misconfiguration never escape as errors; they surface as a
//! DIRECT_ANSWER explaining the problem.

pub mod anthropic;
pub mod openai;
pub mod parser;
pub mod prompt;
pub mod types;

use crate::config::EngineConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

pub use types::{AiResponse, ChatMessage, ChatRequest, Preferences};

#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the provider has usable credentials. Unconfigured providers
    /// still answer `chat` with a DIRECT_ANSWER explaining the situation.
    fn is_configured(&self) -> bool;

    /// Whether the provider can be trusted to drive the clarification flow.
    fn supports_clarification(&self) -> bool {
        true
    }

    async fn chat(&self, request: &ChatRequest) -> Result<AiResponse>;

    /// Streaming variant: text deltas go through `chunks` as they arrive.
    /// A dropped receiver cancels forwarding but the accumulated text is
    /// still parsed into the final response.
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        chunks: UnboundedSender<String>,
    ) -> Result<AiResponse>;
}

/// Pick a provider from configuration; `None` selects the heuristic
/// generator fallback.
pub fn provider_from_config(config: &EngineConfig) -> Option<Arc<dyn AiProvider>> {
    match config.ai_provider.to_lowercase().as_str() {
        "openai" => {
            info!("using OpenAI provider");
            Some(Arc::new(openai::OpenAiProvider::new(config)))
        }
        "anthropic" => {
            info!("using Anthropic provider");
            Some(Arc::new(anthropic::AnthropicProvider::new(config)))
        }
        _ => None,
    }
}
