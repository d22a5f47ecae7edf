//! Configuration management for Parley
//!
//! Everything is read from the environment; there is no config file.

use crate::{Error, Result};

/// Default recording duration in seconds
pub const DEFAULT_RECORDING_SECS: u64 = 5;

/// Parley configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Voice configuration
    pub voice: VoiceConfig,

    /// LLM backend configuration
    pub llm: LlmConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Default recording duration in seconds
    pub recording_secs: u64,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable speech output
    pub tts_enabled: bool,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Transcription language hint
    pub language: String,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            tts_enabled: true,
            stt_model: "whisper-1".to_string(),
            language: "en".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
        }
    }
}

/// LLM backend configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL for the chat completions API
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Max tokens per completion
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper STT, TTS, and chat unless overridden)
    pub openai: Option<String>,

    /// `OpenRouter` API key (unified access to multiple LLM providers)
    pub openrouter: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns error if no LLM API key is available
    pub fn from_env() -> Result<Self> {
        let api_keys = ApiKeys {
            openai: std::env::var("OPENAI_API_KEY").ok(),
            openrouter: std::env::var("OPENROUTER_API_KEY").ok(),
            deepgram: std::env::var("DEEPGRAM_API_KEY").ok(),
            elevenlabs: std::env::var("ELEVENLABS_API_KEY").ok(),
        };

        if api_keys.openai.is_none() && api_keys.openrouter.is_none() {
            return Err(Error::Config(
                "OPENAI_API_KEY or OPENROUTER_API_KEY required".to_string(),
            ));
        }

        let mut llm = LlmConfig::default();
        if api_keys.openai.is_none() {
            // OpenRouter key only: route chat through OpenRouter
            llm.base_url = "https://openrouter.ai/api/v1".to_string();
        }
        if let Ok(url) = std::env::var("PARLEY_LLM_BASE_URL") {
            llm.base_url = url;
        }
        if let Ok(model) = std::env::var("PARLEY_LLM_MODEL") {
            llm.model = model;
        }

        let mut voice = VoiceConfig::default();
        if api_keys.deepgram.is_some() {
            voice.stt_model = "nova-2".to_string();
        }
        if let Ok(model) = std::env::var("PARLEY_STT_MODEL") {
            voice.stt_model = model;
        }
        if let Ok(voice_id) = std::env::var("PARLEY_TTS_VOICE") {
            voice.tts_voice = voice_id;
        }
        if std::env::var("PARLEY_DISABLE_SPEECH").is_ok() {
            voice.tts_enabled = false;
        }

        let recording_secs = std::env::var("PARLEY_RECORD_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RECORDING_SECS);

        Ok(Self {
            voice,
            llm,
            api_keys,
            recording_secs,
        })
    }

    /// The API key used for chat completions
    #[must_use]
    pub fn llm_api_key(&self) -> Option<&str> {
        if self.llm.base_url.contains("openrouter") {
            self.api_keys.openrouter.as_deref()
        } else {
            self.api_keys.openai.as_deref()
        }
    }
}
