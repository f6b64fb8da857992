//! OpenAI chat-completions provider.

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

pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    sample_cap: usize,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: &EngineConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.ai_timeout)
            .build()
            .unwrap_or_default();
        Self {
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.openai_model.clone(),
            sample_cap: config.sample_row_cap,
            client,
        }
    }

    fn messages(&self, request: &ChatRequest) -> Vec<Value> {
        let mut messages = vec![json!({ "role": "system", "content": SYSTEM_PROMPT })];
        for msg in &request.history {
            messages.push(json!({ "role": msg.role, "content": msg.content }));
        }
        messages.push(json!({
            "role": "user",
            "content": build_user_prompt(request, self.sample_cap)
        }));
        messages
    }

    fn body(&self, request: &ChatRequest, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": self.messages(request),
            "temperature": 0.1,
            "stream": stream,
        })
    }

    fn unconfigured(&self) -> AiResponse {
        AiResponse::direct_answer(
            "The OpenAI provider is not configured. Set OPENAI_API_KEY to enable AI answers; \
             falling back is up to the caller.",
        )
    }

    async fn send(&self, body: Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| EngineError::Provider("no content in completion".to_string()))
        }
        .await;

        match result {
            Ok(text) => Ok(parse_or_fallback(&text)),
            Err(e) => {
                warn!("openai chat failed: {}", e);
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
                // SSE frames are newline-delimited; keep the last partial line.
                while let Some(pos) = pending.find('\n') {
                    let line = pending[..pos].trim().to_string();
                    pending.drain(..=pos);
                    let Some(payload) = line.strip_prefix("data: ") else { continue };
                    if payload == "[DONE]" {
                        return Ok(());
                    }
                    if let Ok(event) = serde_json::from_str::<Value>(payload) {
                        if let Some(delta) = event
                            .pointer("/choices/0/delta/content")
                            .and_then(Value::as_str)
                        {
                            accumulator.push(delta);
                            if forwarding && chunks.send(delta.to_string()).is_err() {
                                // Receiver dropped: stop forwarding, keep accumulating.
                                forwarding = false;
                            }
                        }
                    }
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = streamed {
            warn!("openai stream truncated: {}", e);
        }
        Ok(parse_or_fallback(accumulator.text()))
    }
}
