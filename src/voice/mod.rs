//! Voice pipeline: capture, transcription, synthesis, and playback

mod capture;
mod playback;
mod stt;
mod tts;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioChunk, AudioSink, CpalSink, PlaybackSession, POLL_INTERVAL};
pub use stt::{SpeechToText, Transcriber};
pub use tts::{SpeechSynthesis, Synthesizer, TTS_SAMPLE_RATE};
