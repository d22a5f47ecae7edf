//! Dialogue engine
//!
//! Runs one turn as a small state machine: append the user message,
//! retrieve background context, stream a completion, execute any
//! requested tool calls, and loop back to generation until the model
//! stops asking for tools.
//!
//! Tokens are produced lazily over a channel; the single reader consumes
//! them in a loop. If any stage fails the turn aborts with a terminal
//! error token and the conversation keeps only the user message — no
//! partial assistant text is ever persisted.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::agent::backend::{ChatBackend, ChatEvent};
use crate::agent::memory::{ConversationState, ConversationStore, Message, ToolCall};
use crate::agent::retrieval::ContextRetriever;
use crate::agent::tools::ToolRegistry;
use crate::{Error, Result};

/// Maximum tool round-trips per turn before the turn fails
///
/// The originating design had no bound, so a model that always requests
/// tools could cycle forever.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// Default system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Keep responses concise and conversational.";

/// One token of a streamed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseToken {
    pub session_id: String,
    /// Text delta, or the tool name when `is_tool_call` is set
    pub text: String,
    /// Marks a tool-invocation notification rather than reply text
    pub is_tool_call: bool,
}

/// Lazy, finite sequence of response tokens for one turn
///
/// Ends with `None` after the turn completes; a stage failure surfaces
/// as a single terminal `Err` item.
pub struct TokenStream {
    rx: mpsc::Receiver<Result<ResponseToken>>,
}

impl TokenStream {
    /// Await the next token
    pub async fn next_token(&mut self) -> Option<Result<ResponseToken>> {
        self.rx.recv().await
    }
}

impl Stream for TokenStream {
    type Item = Result<ResponseToken>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// In-progress tool call assembled from streaming events
#[derive(Default, Clone)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Turn state machine phases
enum TurnPhase {
    Entry,
    Context,
    Respond,
    Tools(Vec<PendingToolCall>),
    Done,
    /// Reader dropped the token stream; end the turn without persisting
    Abandoned,
}

/// Turn-scoped dialogue state machine over a chat backend
pub struct DialogueEngine {
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn ConversationStore>,
    retriever: Arc<dyn ContextRetriever>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    max_tool_rounds: usize,
    /// Per-session turn locks: at most one in-flight turn mutates a
    /// session's conversation at a time
    turn_locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DialogueEngine {
    /// Create an engine over the given collaborators
    #[must_use]
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn ConversationStore>,
        retriever: Arc<dyn ContextRetriever>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            backend,
            store,
            retriever,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_rounds: MAX_TOOL_ROUNDS,
            turn_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Override the system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Override the tool round-trip bound
    #[must_use]
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Run one turn, returning the token stream for it
    ///
    /// The returned stream is finite and must not be shared: one reader
    /// consumes it to completion. Dropping it cancels the turn.
    #[must_use]
    pub fn run_turn(self: &Arc<Self>, session_id: &str, user_text: &str) -> TokenStream {
        let (tx, rx) = mpsc::channel(64);
        let engine = Arc::clone(self);
        let session_id = session_id.to_string();
        let user_text = user_text.to_string();

        tokio::spawn(async move {
            let lock = engine.turn_lock(&session_id);
            let _guard = lock.lock().await;

            if let Err(e) = engine.turn(&session_id, &user_text, &tx).await {
                tracing::warn!(session_id = %session_id, error = %e, "turn failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        TokenStream { rx }
    }

    fn turn_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.turn_locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Drive the state machine for one turn
    async fn turn(
        &self,
        session_id: &str,
        user_text: &str,
        tx: &mpsc::Sender<Result<ResponseToken>>,
    ) -> Result<()> {
        // Assistant and tool messages accumulate locally; the store only
        // sees them once the turn completes.
        let mut state = self.store.get(session_id).await;
        let mut rounds_used = 0usize;
        let mut phase = TurnPhase::Entry;

        loop {
            phase = match phase {
                TurnPhase::Entry => {
                    state.messages.push(Message::user(user_text));
                    self.store.put(state.clone()).await;
                    TurnPhase::Context
                }

                TurnPhase::Context => {
                    match self.retriever.retrieve(user_text).await {
                        Ok(context) => state.retrieved_context = context,
                        Err(e) => {
                            tracing::warn!(error = %e, "context retrieval failed");
                            state.retrieved_context.clear();
                        }
                    }
                    TurnPhase::Respond
                }

                TurnPhase::Respond => self.respond(session_id, &mut state, tx).await?,

                TurnPhase::Tools(pending) => {
                    rounds_used += 1;
                    if rounds_used > self.max_tool_rounds {
                        return Err(Error::Dialogue(format!(
                            "tool round limit exceeded ({} rounds)",
                            self.max_tool_rounds
                        )));
                    }
                    self.execute_tools(session_id, &pending, &mut state, tx).await?
                }

                TurnPhase::Done => {
                    self.store.put(state).await;
                    return Ok(());
                }

                TurnPhase::Abandoned => return Ok(()),
            };
        }
    }

    /// Stream one completion, forwarding text deltas as tokens
    async fn respond(
        &self,
        session_id: &str,
        state: &mut ConversationState,
        tx: &mpsc::Sender<Result<ResponseToken>>,
    ) -> Result<TurnPhase> {
        let definitions = self.tools.definitions();
        let request = self.request_messages(state);
        let mut stream = self.backend.stream_chat(&request, &definitions).await?;

        let mut turn_text = String::new();
        let mut pending: Vec<PendingToolCall> = Vec::new();
        let mut finish_reason = None;

        while let Some(event) = stream.next().await {
            match event? {
                ChatEvent::ContentDelta(text) => {
                    turn_text.push_str(&text);
                    let token = ResponseToken {
                        session_id: session_id.to_string(),
                        text,
                        is_tool_call: false,
                    };
                    if tx.send(Ok(token)).await.is_err() {
                        // Reader dropped the stream: the turn is cancelled
                        // and nothing beyond the user message persists.
                        tracing::debug!(session_id, "token reader gone, abandoning turn");
                        return Ok(TurnPhase::Abandoned);
                    }
                }
                ChatEvent::ToolCallStart { index, id, name } => {
                    let idx = index as usize;
                    if idx >= pending.len() {
                        pending.resize_with(idx + 1, PendingToolCall::default);
                    }
                    pending[idx].id = id;
                    pending[idx].name = name;
                }
                ChatEvent::ToolCallDelta { index, arguments } => {
                    let idx = index as usize;
                    if idx < pending.len() {
                        pending[idx].arguments.push_str(&arguments);
                    }
                }
                ChatEvent::Done { finish_reason: fr } => {
                    finish_reason = fr;
                    break;
                }
            }
        }

        if finish_reason.as_deref() == Some("tool_calls") && !pending.is_empty() {
            let tool_calls: Vec<ToolCall> = pending
                .iter()
                .map(|tc| ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                })
                .collect();
            state
                .messages
                .push(Message::assistant_with_tools(turn_text, tool_calls));
            return Ok(TurnPhase::Tools(pending));
        }

        state.messages.push(Message::assistant(turn_text));
        Ok(TurnPhase::Done)
    }

    /// Execute requested tool calls in order, appending their results,
    /// then hand back to generation (or abandon if the reader is gone)
    async fn execute_tools(
        &self,
        session_id: &str,
        pending: &[PendingToolCall],
        state: &mut ConversationState,
        tx: &mpsc::Sender<Result<ResponseToken>>,
    ) -> Result<TurnPhase> {
        for tc in pending {
            tracing::debug!(tool = %tc.name, args = %tc.arguments, "executing tool");

            let token = ResponseToken {
                session_id: session_id.to_string(),
                text: tc.name.clone(),
                is_tool_call: true,
            };
            if tx.send(Ok(token)).await.is_err() {
                tracing::debug!(session_id, "token reader gone, abandoning turn");
                return Ok(TurnPhase::Abandoned);
            }

            let result = self
                .tools
                .invoke(&tc.name, &tc.arguments)
                .map_err(|e| Error::Dialogue(e.to_string()))?;

            state.messages.push(Message::tool(&tc.id, result));
        }
        Ok(TurnPhase::Respond)
    }

    /// Wire messages for a completion request: system prompt, retrieved
    /// context, then the conversation so far
    fn request_messages(&self, state: &ConversationState) -> Vec<Message> {
        let mut messages = vec![Message::system(&self.system_prompt)];
        if !state.retrieved_context.is_empty() {
            messages.push(Message::system(format!(
                "Background context:\n{}",
                state.retrieved_context
            )));
        }
        messages.extend(state.messages.iter().cloned());
        messages
    }
}
