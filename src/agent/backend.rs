//! Language-model backend interface
//!
//! The dialogue engine consumes a lazy stream of chat events from any
//! backend implementing [`ChatBackend`]. Tool-call requests arrive
//! inline in the stream, assembled incrementally across deltas.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::Result;
use crate::agent::memory::Message;
use crate::agent::tools::ToolDefinition;

/// One event in a streamed chat completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A fragment of assistant text
    ContentDelta(String),
    /// Start of a tool call at the given index
    ToolCallStart { index: u32, id: String, name: String },
    /// Argument fragment for the tool call at the given index
    ToolCallDelta { index: u32, arguments: String },
    /// Completion finished
    Done { finish_reason: Option<String> },
}

/// Boxed stream of chat events
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;

/// A chat-completion backend capable of streaming and tool use
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streaming completion over `messages` with `tools` declared
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable or rejects the request
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatEventStream>;
}
