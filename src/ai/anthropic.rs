//! Anthropic messages-API provider.

use crate::ai::parser::{parse_or_fallback, StreamAccumulator};
use crate::ai::prompt::{build_user_prompt, SYSTEM_PROMPT};
use crate::ai::types::{AiResponse, ChatRequest};
use crate::ai::AiProvider;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    model: String,
    sample_cap: usize,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: &EngineConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.ai_timeout)
            .build()
            .unwrap_or_default();
        Self {
            api_key: config.anthropic_api_key.clone(),
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            model: config.anthropic_model.clone(),
            sample_cap: config.sample_row_cap,
            client,
        }
    }

    fn body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut messages: Vec<Value> = request
            .history
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();
        messages.push(json!({
            "role": "user",
            "content": build_user_prompt(request, self.sample_cap)
        }));
        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": SYSTEM_PROMPT,
            "messages": messages,
            "stream": stream,
        })
    }

    async fn send(&self, body: Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }

    fn unconfigured(&self) -> AiResponse {
        AiResponse::direct_answer(
            "The Anthropic provider is not configured. Set ANTHROPIC_API_KEY to enable AI answers.",
        )
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<AiResponse> {
        if !self.is_configured() {
            return Ok(self.unconfigured());
        }

        let result: Result<String> = async {
            let response: Value = self.send(self.body(request, false)).await?.json().await?;
            response
                .pointer("/content/0/text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| EngineError::Provider("no text block in message".to_string()))
        }
        .await;

        match result {
            Ok(text) => Ok(parse_or_fallback(&text)),
            Err(e) => {
                warn!("anthropic chat failed: {}", e);
                Ok(AiResponse::direct_answer(format!("The AI provider call failed: {}", e)))
            }
        }
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        chunks: UnboundedSender<String>,
    ) -> Result<AiResponse> {
        if !self.is_configured() {
            return Ok(self.unconfigured());
        }

        let mut accumulator = StreamAccumulator::new();
        let mut forwarding = true;

        let streamed: Result<()> = async {
            let mut response = self.send(self.body(request, true)).await?;
            let mut pending = String::new();
            while let Some(bytes) = response.chunk().await? {
                pending.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = pending.find('\n') {
                    let line = pending[..pos].trim().to_string();
                    pending.drain(..=pos);
                    let Some(payload) = line.strip_prefix("data: ") else { continue };
                    let Ok(event) = serde_json::from_str::<Value>(payload) else { continue };
                    match event.get("type").and_then(Value::as_str) {
                        Some("content_block_delta") => {
                            if let Some(delta) =
                                event.pointer("/delta/text").and_then(Value::as_str)
                            {
                                accumulator.push(delta);
                                if forwarding && chunks.send(delta.to_string()).is_err() {
                                    forwarding = false;
                                }
                            }
                        }
                        Some("message_stop") => return Ok(()),
                        _ => {}
                    }
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = streamed {
            warn!("anthropic stream truncated: {}", e);
        }
        Ok(parse_or_fallback(accumulator.text()))
    }
}
