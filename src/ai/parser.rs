//! Shared streaming accumulator and response parser.
//!
//! Providers deliver text deltas in provider-specific wire shapes; all of
//! them funnel into one accumulated document that is parsed here. The parser
//! must tolerate truncated or malformed JSON: `parse_or_fallback` turns any
//! failure into a DIRECT_ANSWER-shaped response carrying the error, so a
//! dropped transport never crashes the caller.

use crate::ai::types::AiResponse;
use crate::error::{EngineError, Result};

/// Accumulates incremental text fragments into one document.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    buffer: String,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &str) {
        self.buffer.push_str(delta);
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn into_text(self) -> String {
        self.buffer
    }
}

/// Cut the JSON document out of a model reply that may wrap it in prose or
/// markdown code fences.
pub fn extract_json(response: &str) -> String {
    let json_start = response.find('{');
    let json_end = response.rfind('}');
    if let (Some(start), Some(end)) = (json_start, json_end) {
        if start < end {
            return response[start..=end].to_string();
        }
    }

    if let Some(start) = response.find("```json") {
        let after = &response[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }
    if let Some(start) = response.find("```") {
        let after = &response[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }
    response.to_string()
}

/// Strict parse of the accumulated text into the discriminated response
/// shape. Unknown `type` or `requestType` values are hard errors here.
pub fn parse_response(text: &str) -> Result<AiResponse> {
    let json = extract_json(text);
    serde_json::from_str(&json)
        .map_err(|e| EngineError::Provider(format!("malformed AI response: {}", e)))
}

/// Tolerant wrapper: parse failures become a DIRECT_ANSWER carrying the
/// error, so the failure is visible to the caller without being fatal.
pub fn parse_or_fallback(text: &str) -> AiResponse {
    match parse_response(text) {
        Ok(response) => response,
        Err(e) => AiResponse::direct_answer(format!(
            "The AI response could not be interpreted ({}). Raw reply: {}",
            e,
            truncate(text, 400)
        )),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
