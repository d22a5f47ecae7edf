//! Per-run session settings
//!
//! A session spans multiple turns and holds the mutable settings the
//! interactive shell commands operate on. Conversation history lives in
//! the conversation store, keyed by `session_id`.

use std::time::Duration;

use crate::config::Config;

/// Session settings for one interactive run
#[derive(Debug, Clone)]
pub struct Session {
    /// Stable identifier used to key conversation history
    pub session_id: String,

    /// STT model selector for this session
    pub stt_model: String,

    /// Whether replies are spoken aloud
    pub tts_enabled: bool,

    /// How long each recording lasts
    pub recording_duration: Duration,
}

impl Session {
    /// Create a session from configuration with a fresh random id
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            stt_model: config.voice.stt_model.clone(),
            tts_enabled: config.voice.tts_enabled,
            recording_duration: Duration::from_secs(config.recording_secs),
        }
    }

    /// Set the recording duration in whole seconds
    pub fn set_recording_secs(&mut self, secs: u64) {
        self.recording_duration = Duration::from_secs(secs);
    }
}
