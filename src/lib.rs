//! Parley - voice-driven conversational agent
//!
//! Records speech, transcribes it, runs a tool-capable dialogue engine
//! against an OpenAI-compatible chat backend, and speaks the streamed
//! reply sentence by sentence while later sentences are still being
//! generated.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   Interfaces                     │
//! │      Interactive shell    │    HTTP /chat        │
//! └──────────────────┬───────────────────────────────┘
//!                    │
//! ┌──────────────────▼───────────────────────────────┐
//! │                 Orchestrator                     │
//! │  Capture │ STT │ Dialogue │ Segmenter │ TTS      │
//! └──────────────────┬───────────────────────────────┘
//!                    │
//! ┌──────────────────▼───────────────────────────────┐
//! │               Playback queue                     │
//! │      ordered PCM chunks → output device          │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod segment;
pub mod session;
pub mod voice;

pub use agent::{
    ChatBackend, ContextRetriever, DialogueEngine, InMemoryStore, OpenAiBackend, ResponseToken,
    StaticContextRetriever, TokenStream, ToolRegistry,
};
pub use config::Config;
pub use daemon::{NO_SPEECH_MESSAGE, Orchestrator};
pub use error::{Error, Result};
pub use segment::{SentenceSegmenter, SentenceUnit, segment_response};
pub use session::Session;
