//! Conversation memory store
//!
//! History is keyed by session id and lives for the process lifetime.
//! The store is passed into the dialogue engine explicitly; there is no
//! ambient global state.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned call id, echoed in the tool-result message
    pub id: String,
    /// Registered tool name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// One conversation message, immutable once appended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Tool invocations requested alongside this assistant message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For tool-result messages, the id of the call being answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create an assistant message that requests tool calls
    #[must_use]
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(MessageRole::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// Create a tool-result message answering `tool_call_id`
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }
}

/// Conversation history for one session
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub session_id: String,
    /// Ordered messages; insertion order is conversation order
    pub messages: Vec<Message>,
    /// Background context retrieved for the latest turn
    pub retrieved_context: String,
}

impl ConversationState {
    /// Create an empty conversation for a session
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            retrieved_context: String::new(),
        }
    }
}

/// Store of conversation state keyed by session id
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch the conversation for a session, empty if none exists yet
    async fn get(&self, session_id: &str) -> ConversationState;

    /// Replace the conversation for a session
    async fn put(&self, state: ConversationState);
}

/// Process-lifetime in-memory conversation store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    conversations: RwLock<HashMap<String, ConversationState>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get(&self, session_id: &str) -> ConversationState {
        self.conversations
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| ConversationState::new(session_id))
    }

    async fn put(&self, state: ConversationState) {
        self.conversations
            .write()
            .await
            .insert(state.session_id.clone(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_unknown_session_is_empty() {
        let store = InMemoryStore::new();
        let state = store.get("s1").await;
        assert_eq!(state.session_id, "s1");
        assert!(state.messages.is_empty());
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = InMemoryStore::new();
        let mut state = ConversationState::new("s1");
        state.messages.push(Message::user("hello"));
        store.put(state).await;

        let loaded = store.get("s1").await;
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemoryStore::new();
        let mut a = ConversationState::new("a");
        a.messages.push(Message::user("hi"));
        store.put(a).await;

        assert!(store.get("b").await.messages.is_empty());
    }

    #[test]
    fn tool_message_carries_call_id() {
        let msg = Message::tool("call_1", "result");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }
}
