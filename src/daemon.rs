//! Turn orchestrator
//!
//! Ties the pipeline together: record, transcribe, run the dialogue
//! engine, segment the streamed reply into sentences, and synthesize
//! each sentence into the playback queue while earlier ones are still
//! playing. Every stage failure is caught here and turned into a
//! user-facing message; nothing propagates out to kill the session
//! loop.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::DialogueEngine;
use crate::segment::{SentenceSegmenter, SentenceUnit};
use crate::session::Session;
use crate::voice::{
    AudioCapture, AudioChunk, AudioSink, PlaybackSession, SAMPLE_RATE, Synthesizer, Transcriber,
    samples_to_wav,
};

/// Spoken and printed when a recording transcribes to nothing
pub const NO_SPEECH_MESSAGE: &str = "No speech detected.";

/// How long to wait for queued audio after the reply stream ends
const PLAYBACK_GRACE: Duration = Duration::from_secs(30);

/// Drives complete voice turns over the pipeline collaborators
pub struct Orchestrator {
    engine: Arc<DialogueEngine>,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    sink: Arc<dyn AudioSink>,
    session: Session,
}

impl Orchestrator {
    /// Create an orchestrator; `synthesizer` is `None` when speech
    /// output is unavailable
    #[must_use]
    pub fn new(
        engine: Arc<DialogueEngine>,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Option<Arc<dyn Synthesizer>>,
        sink: Arc<dyn AudioSink>,
        session: Session,
    ) -> Self {
        Self {
            engine,
            transcriber,
            synthesizer,
            sink,
            session,
        }
    }

    /// Session settings, for the interactive shell
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Swap the transcription provider, for shell model switching
    pub fn set_transcriber(&mut self, transcriber: Arc<dyn Transcriber>) {
        self.transcriber = transcriber;
    }

    /// Record from the microphone and run one full turn
    ///
    /// Never fails: every stage error becomes the returned user-facing
    /// message.
    #[allow(clippy::future_not_send)]
    pub async fn run_turn(&mut self, capture: &mut AudioCapture) -> String {
        let secs = self.session.recording_duration.as_secs();
        println!("Recording for {secs} seconds... speak now!");

        let samples = match capture.record_for(self.session.recording_duration).await {
            Ok(samples) => samples,
            Err(e) => {
                tracing::error!(error = %e, "audio capture failed");
                return format!("Error occurred: {e}");
            }
        };
        println!("Recording finished.");

        let wav = match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::error!(error = %e, "WAV encoding failed");
                return format!("Error occurred: {e}");
            }
        };

        self.run_turn_with_audio(&wav).await
    }

    /// Run one full turn over already-recorded WAV audio
    ///
    /// An empty or failed transcription short-circuits to the fixed
    /// no-speech message without touching the dialogue engine.
    pub async fn run_turn_with_audio(&mut self, wav: &[u8]) -> String {
        let transcript = match self.transcriber.transcribe(wav).await {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed, treating as no speech");
                String::new()
            }
        };

        if transcript.trim().is_empty() {
            println!("{NO_SPEECH_MESSAGE}");
            self.speak_fallback(NO_SPEECH_MESSAGE).await;
            return NO_SPEECH_MESSAGE.to_string();
        }

        println!("You said: {transcript}");
        self.run_text_turn(&transcript).await
    }

    /// Run one turn over user text, catching dialogue failures
    pub async fn run_text_turn(&mut self, user_text: &str) -> String {
        match self.stream_reply(user_text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                let message = format!("Error occurred: {e}");
                println!("{message}");
                self.speak_fallback(&message).await;
                message
            }
        }
    }

    /// Stream the reply, segmenting into sentences and synthesizing
    /// each into the playback queue as it completes
    async fn stream_reply(&mut self, user_text: &str) -> crate::Result<String> {
        let mut tokens = self
            .engine
            .run_turn(&self.session.session_id, user_text);

        let speak = self.session.tts_enabled && self.synthesizer.is_some();
        let mut playback = PlaybackSession::new(Arc::clone(&self.sink));
        if speak {
            playback.start();
        }

        let mut segmenter = SentenceSegmenter::new();
        let mut reply = String::new();

        while let Some(token) = tokens.next_token().await {
            let token = match token {
                Ok(token) => token,
                Err(e) => {
                    playback.stop().await;
                    return Err(e);
                }
            };

            if token.is_tool_call {
                tracing::info!(tool = %token.text, "invoking tool");
                continue;
            }

            print!("{}", token.text);
            let _ = std::io::stdout().flush();
            reply.push_str(&token.text);

            if speak {
                for unit in segmenter.feed(&token.text) {
                    self.synthesize_into(&playback, &unit).await;
                }
            }
        }
        println!();

        if speak {
            if let Some(unit) = segmenter.flush() {
                self.synthesize_into(&playback, &unit).await;
            }
            playback.wait_idle(PLAYBACK_GRACE).await;
            playback.stop().await;
        }

        Ok(reply)
    }

    /// Synthesize one sentence and enqueue it; a failed sentence is
    /// skipped so the rest of the reply still plays
    async fn synthesize_into(&self, playback: &PlaybackSession, unit: &SentenceUnit) {
        let Some(synthesizer) = &self.synthesizer else {
            return;
        };

        match synthesizer.synthesize(&unit.text).await {
            Ok(pcm) => {
                let chunk = AudioChunk {
                    pcm,
                    sample_rate: synthesizer.sample_rate(),
                    sequence: unit.sequence,
                };
                if let Err(e) = playback.enqueue(chunk) {
                    tracing::warn!(error = %e, sequence = unit.sequence, "enqueue failed");
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    sequence = unit.sequence,
                    "sentence synthesis failed, skipping its audio"
                );
            }
        }
    }

    /// Best-effort spoken delivery of a status message; failures here
    /// are logged and discarded
    async fn speak_fallback(&self, text: &str) {
        if !self.session.tts_enabled {
            return;
        }
        let Some(synthesizer) = &self.synthesizer else {
            return;
        };

        let pcm = match synthesizer.synthesize(text).await {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::debug!(error = %e, "fallback synthesis failed");
                return;
            }
        };

        let chunk = AudioChunk {
            pcm,
            sample_rate: synthesizer.sample_rate(),
            sequence: 0,
        };

        let mut playback = PlaybackSession::new(Arc::clone(&self.sink));
        playback.start();
        if playback.enqueue(chunk).is_ok() {
            playback.wait_idle(PLAYBACK_GRACE).await;
        }
        playback.stop().await;
    }
}
