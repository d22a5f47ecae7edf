//! Shared test doubles for the pipeline seams
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use parley::agent::{ChatBackend, ChatEvent, ChatEventStream, Message};
use parley::agent::tools::ToolDefinition;
use parley::voice::{AudioSink, Synthesizer, Transcriber};
use parley::{Error, Result};

/// Scripted chat backend: each `stream_chat` call plays back the next
/// round of events
pub struct MockBackend {
    rounds: Mutex<VecDeque<Vec<Result<ChatEvent>>>>,
    calls: AtomicUsize,
    fail_on_request: bool,
}

impl MockBackend {
    pub fn new(rounds: Vec<Vec<Result<ChatEvent>>>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into_iter().collect()),
            calls: AtomicUsize::new(0),
            fail_on_request: false,
        }
    }

    /// Backend whose requests always fail outright
    pub fn unreachable() -> Self {
        Self {
            rounds: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            fail_on_request: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn stream_chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ChatEventStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_on_request {
            return Err(Error::Dialogue("backend unreachable".to_string()));
        }

        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Ok(ChatEvent::Done { finish_reason: None })]);

        Ok(Box::pin(futures::stream::iter(round)))
    }
}

/// A round of plain text deltas ending in a normal stop
pub fn text_round(chunks: &[&str]) -> Vec<Result<ChatEvent>> {
    let mut events: Vec<Result<ChatEvent>> = chunks
        .iter()
        .map(|c| Ok(ChatEvent::ContentDelta((*c).to_string())))
        .collect();
    events.push(Ok(ChatEvent::Done {
        finish_reason: Some("stop".to_string()),
    }));
    events
}

/// A round requesting a single tool call, arguments split across deltas
pub fn tool_round(id: &str, name: &str, argument_chunks: &[&str]) -> Vec<Result<ChatEvent>> {
    let mut events: Vec<Result<ChatEvent>> = vec![Ok(ChatEvent::ToolCallStart {
        index: 0,
        id: id.to_string(),
        name: name.to_string(),
    })];
    for chunk in argument_chunks {
        events.push(Ok(ChatEvent::ToolCallDelta {
            index: 0,
            arguments: (*chunk).to_string(),
        }));
    }
    events.push(Ok(ChatEvent::Done {
        finish_reason: Some("tool_calls".to_string()),
    }));
    events
}

/// A round that dies mid-stream after some text
pub fn broken_round(chunks: &[&str]) -> Vec<Result<ChatEvent>> {
    let mut events: Vec<Result<ChatEvent>> = chunks
        .iter()
        .map(|c| Ok(ChatEvent::ContentDelta((*c).to_string())))
        .collect();
    events.push(Err(Error::Dialogue("stream cut off".to_string())));
    events
}

/// Transcriber returning a fixed result
pub struct MockTranscriber {
    result: Option<String>,
}

impl MockTranscriber {
    pub fn returning(transcript: &str) -> Self {
        Self {
            result: Some(transcript.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { result: None }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _wav: &[u8]) -> Result<String> {
        self.result
            .clone()
            .ok_or_else(|| Error::Transcription("service down".to_string()))
    }
}

/// Synthesizer that records every request and returns the text bytes
/// as fake PCM; optionally fails on matching sentences
pub struct MockSynthesizer {
    pub synthesized: Mutex<Vec<String>>,
    fail_containing: Option<String>,
    delay: Duration,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            synthesized: Mutex::new(Vec::new()),
            fail_containing: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_on(substring: &str) -> Self {
        Self {
            fail_containing: Some(substring.to_string()),
            ..Self::new()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.synthesized.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(needle) = &self.fail_containing
            && text.contains(needle.as_str())
        {
            return Err(Error::Synthesis(format!("refusing to speak: {text}")));
        }
        self.synthesized.lock().unwrap().push(text.to_string());
        Ok(text.as_bytes().to_vec())
    }
}

/// Sink that records played chunks instead of touching audio hardware
pub struct RecordingSink {
    pub played: Mutex<Vec<Vec<u8>>>,
    delay: Duration,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Played chunks decoded back to strings (pairs with
    /// [`MockSynthesizer`]'s fake PCM)
    pub fn played_texts(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(|pcm| String::from_utf8_lossy(pcm).into_owned())
            .collect()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, pcm: &[u8]) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(Error::Playback("device gone".to_string()));
        }
        self.played.lock().unwrap().push(pcm.to_vec());
        Ok(())
    }
}
