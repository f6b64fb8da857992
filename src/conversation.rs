//! Per-conversation in-memory state cache.
//!
//! States are created lazily on first access and swept once their idle time
//! passes the TTL. Get-or-create is atomic via the map's entry API; field
//! mutation beyond that is serialized per conversation by the state's own
//! lock, but two concurrent turns for the same conversation still interleave
//! at turn granularity — whole-turn serialization is the caller's concern.

use crate::ai::types::{AiResponse, ChatMessage};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ConversationState {
    pub conversation_id: String,
    /// Ordered messages, oldest first.
    pub history: Vec<ChatMessage>,
    /// Derived context: last intent, last response type.
    pub context: HashMap<String, String>,
    pub last_response: Option<AiResponse>,
    pub last_updated: DateTime<Utc>,
}

impl ConversationState {
    fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            history: Vec::new(),
            context: HashMap::new(),
            last_response: None,
            last_updated: Utc::now(),
        }
    }
}

pub struct ConversationManager {
    states: DashMap<String, Arc<Mutex<ConversationState>>>,
    ttl: Duration,
}

impl ConversationManager {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            states: DashMap::new(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1)),
        }
    }

    /// Atomic get-or-create: at most one state is ever created per id.
    pub fn get_or_create(&self, conversation_id: &str) -> Arc<Mutex<ConversationState>> {
        self.states
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                debug!(conversation = %conversation_id, "creating conversation state");
                Arc::new(Mutex::new(ConversationState::new(conversation_id)))
            })
            .clone()
    }

    pub fn add_user_message(&self, conversation_id: &str, text: &str) {
        let state = self.get_or_create(conversation_id);
        let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
        state.history.push(ChatMessage::user(text));
        state.last_updated = Utc::now();
    }

    /// Record the latest AI response and refresh derived context.
    pub fn update_state(&self, conversation_id: &str, response: &AiResponse) {
        let state = self.get_or_create(conversation_id);
        let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .context
            .insert("last_response_type".to_string(), response.response_type().to_string());
        if let Some(intent) = response.intent() {
            state.context.insert("last_intent".to_string(), intent.to_string());
        }
        if !response.content().is_empty() {
            state.history.push(ChatMessage::assistant(response.content()));
        }
        state.last_response = Some(response.clone());
        state.last_updated = Utc::now();
    }

    /// Snapshot of the message history for prompt building.
    pub fn history(&self, conversation_id: &str) -> Vec<ChatMessage> {
        let state = self.get_or_create(conversation_id);
        let state = state.lock().unwrap_or_else(|p| p.into_inner());
        state.history.clone()
    }

    /// Explicit teardown of one conversation.
    pub fn cleanup(&self, conversation_id: &str) {
        self.states.remove(conversation_id);
    }

    /// Sweep every state idle past the TTL. Returns the eviction count.
    pub fn cleanup_stale(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let before = self.states.len();
        self.states.retain(|_, state| {
            state
                .lock()
                .map(|s| s.last_updated >= cutoff)
                .unwrap_or(false)
        });
        let evicted = before - self.states.len();
        if evicted > 0 {
            info!(evicted, "swept stale conversation states");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConversationManager {
        ConversationManager::new(std::time::Duration::from_secs(3600))
    }

    #[test]
    fn get_or_create_returns_the_same_state() {
        let mgr = manager();
        let a = mgr.get_or_create("c-1");
        let b = mgr.get_or_create("c-1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn update_state_tracks_intent_and_response_type() {
        let mgr = manager();
        mgr.add_user_message("c-1", "how many users");
        let response: AiResponse = serde_json::from_str(
            r#"{"type": "DIRECT_ANSWER", "content": "42 users", "intent": "COUNT"}"#,
        )
        .unwrap();
        mgr.update_state("c-1", &response);

        let state = mgr.get_or_create("c-1");
        let state = state.lock().unwrap();
        assert_eq!(state.context["last_response_type"], "DIRECT_ANSWER");
        assert_eq!(state.context["last_intent"], "COUNT");
        assert_eq!(state.history.len(), 2);
        assert!(state.last_response.is_some());
    }

    #[test]
    fn cleanup_stale_evicts_idle_states_only() {
        let mgr = ConversationManager::new(std::time::Duration::from_secs(3600));
        mgr.get_or_create("old");
        mgr.get_or_create("fresh");
        {
            let old = mgr.get_or_create("old");
            old.lock().unwrap().last_updated = Utc::now() - Duration::hours(2);
        }
        assert_eq!(mgr.cleanup_stale(), 1);
        assert_eq!(mgr.len(), 1);
        assert!(mgr.states.contains_key("fresh"));
    }

    #[test]
    fn explicit_cleanup_removes_state() {
        let mgr = manager();
        mgr.get_or_create("c-1");
        mgr.cleanup("c-1");
        assert!(mgr.is_empty());
    }
}
