//! Engine configuration loaded from the environment.
//!
//! All tunables live here: provider credentials, network timeouts, and the
//! row caps that keep sample data and result sets bounded.

use std::time::Duration;

/// Runtime configuration for the orchestration engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Which AI provider to use: "openai", "anthropic", or empty for the
    /// heuristic generator only.
    pub ai_provider: String,

    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,

    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub anthropic_model: String,

    /// Endpoint for the best-effort schema-training push. Empty disables it.
    pub training_endpoint: String,

    /// Short timeout for establishing connections.
    pub connect_timeout: Duration,
    /// Fixed timeout for a single statement execution.
    pub statement_timeout: Duration,
    /// Longer timeout for full AI completions.
    pub ai_timeout: Duration,

    /// Maximum sample rows captured per table during schema extraction.
    pub sample_row_cap: usize,
    /// Row cap stamped onto every heuristically generated query.
    pub result_row_cap: usize,

    /// Idle conversations older than this are swept from the cache.
    pub conversation_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ai_provider: String::new(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o".to_string(),
            anthropic_api_key: String::new(),
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            training_endpoint: String::new(),
            connect_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(30),
            ai_timeout: Duration::from_secs(120),
            sample_row_cap: 5,
            result_row_cap: 100,
            conversation_ttl: Duration::from_secs(3600),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Call `dotenv::dotenv()` first if a
    /// `.env` file should be honored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ai_provider: env_or("AI_PROVIDER", &defaults.ai_provider),
            openai_api_key: env_or("OPENAI_API_KEY", &defaults.openai_api_key),
            openai_base_url: env_or("OPENAI_BASE_URL", &defaults.openai_base_url),
            openai_model: env_or("OPENAI_MODEL", &defaults.openai_model),
            anthropic_api_key: env_or("ANTHROPIC_API_KEY", &defaults.anthropic_api_key),
            anthropic_base_url: env_or("ANTHROPIC_BASE_URL", &defaults.anthropic_base_url),
            anthropic_model: env_or("ANTHROPIC_MODEL", &defaults.anthropic_model),
            training_endpoint: env_or("SCHEMA_TRAINING_ENDPOINT", &defaults.training_endpoint),
            connect_timeout: env_secs("CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            statement_timeout: env_secs("STATEMENT_TIMEOUT_SECS", defaults.statement_timeout),
            ai_timeout: env_secs("AI_TIMEOUT_SECS", defaults.ai_timeout),
            sample_row_cap: env_usize("SAMPLE_ROW_CAP", defaults.sample_row_cap),
            result_row_cap: env_usize("RESULT_ROW_CAP", defaults.result_row_cap),
            conversation_ttl: env_secs("CONVERSATION_TTL_SECS", defaults.conversation_ttl),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}
