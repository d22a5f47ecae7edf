//! OpenAI-compatible streaming chat client
//!
//! Speaks the chat-completions SSE wire format, which OpenRouter and
//! most hosted providers also expose.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::backend::{ChatBackend, ChatEvent, ChatEventStream};
use crate::agent::memory::{Message, MessageRole};
use crate::agent::tools::ToolDefinition;
use crate::{Error, Result};

/// Streams chat completions from an OpenAI-compatible endpoint
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunctionCall,
}

#[derive(Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Deserialize)]
struct StreamToolCall {
    index: u32,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

impl OpenAiBackend {
    /// Create a new backend client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::Config("LLM API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            max_tokens,
        })
    }

    fn wire_messages(messages: &[Message]) -> Vec<WireMessage<'_>> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                    MessageRole::Tool => "tool",
                },
                content: &m.content,
                tool_calls: m.tool_calls.as_ref().map(|calls| {
                    calls
                        .iter()
                        .map(|tc| WireToolCall {
                            id: tc.id.clone(),
                            call_type: "function",
                            function: WireFunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect()
                }),
                tool_call_id: m.tool_call_id.as_deref(),
            })
            .collect()
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatEventStream> {
        let request = ChatRequest {
            model: &self.model,
            messages: Self::wire_messages(messages),
            stream: true,
            max_tokens: self.max_tokens,
            tools: if tools.is_empty() {
                None
            } else {
                Some(
                    tools
                        .iter()
                        .map(|t| WireTool {
                            tool_type: "function",
                            function: t,
                        })
                        .collect(),
                )
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat completion request failed");
                Error::Dialogue(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat API error");
            return Err(Error::Dialogue(format!("chat API error {status}: {body}")));
        }

        let (tx, rx) = mpsc::channel::<Result<ChatEvent>>(64);
        tokio::spawn(forward_sse(response, tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Read the SSE body and forward parsed chat events
async fn forward_sse(response: reqwest::Response, tx: mpsc::Sender<Result<ChatEvent>>) {
    let mut stream = response.bytes_stream().eventsource();
    let mut finished = false;

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                let _ = tx.send(Err(Error::Dialogue(format!("SSE stream error: {e}")))).await;
                return;
            }
        };

        if event.data == "[DONE]" {
            if !finished {
                let _ = tx.send(Ok(ChatEvent::Done { finish_reason: None })).await;
            }
            return;
        }

        let chunk: StreamChunk = match serde_json::from_str(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx
                    .send(Err(Error::Dialogue(format!(
                        "SSE parse error: {e}, data: {}",
                        event.data
                    ))))
                    .await;
                return;
            }
        };

        let Some(choice) = chunk.choices.into_iter().next() else {
            continue;
        };

        if let Some(text) = choice.delta.content
            && !text.is_empty()
            && tx.send(Ok(ChatEvent::ContentDelta(text))).await.is_err()
        {
            return;
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            if let Some(name) = tc.function.as_ref().and_then(|f| f.name.clone()) {
                let started = ChatEvent::ToolCallStart {
                    index: tc.index,
                    id: tc.id.clone().unwrap_or_default(),
                    name,
                };
                if tx.send(Ok(started)).await.is_err() {
                    return;
                }
            }
            if let Some(arguments) = tc.function.and_then(|f| f.arguments)
                && !arguments.is_empty()
            {
                let delta = ChatEvent::ToolCallDelta {
                    index: tc.index,
                    arguments,
                };
                if tx.send(Ok(delta)).await.is_err() {
                    return;
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            finished = true;
            let done = ChatEvent::Done {
                finish_reason: Some(reason),
            };
            if tx.send(Ok(done)).await.is_err() {
                return;
            }
        }
    }

    if !finished {
        let _ = tx
            .send(Err(Error::Dialogue(
                "SSE stream closed before completion".to_string(),
            )))
            .await;
    }
}
