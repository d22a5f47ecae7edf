use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

use parley::agent::{ChatBackend, ContextRetriever, ConversationStore};
use parley::voice::{
    AudioCapture, AudioSink, CpalSink, SpeechSynthesis, SpeechToText, Synthesizer, TTS_SAMPLE_RATE,
    Transcriber,
};
use parley::{
    Config, DialogueEngine, InMemoryStore, OpenAiBackend, Orchestrator, Session,
    StaticContextRetriever, ToolRegistry,
};

/// Parley - voice-driven conversational agent
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Port for the HTTP API
    #[arg(long, env = "PARLEY_PORT", default_value = "8321")]
    port: u16,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable spoken replies (text only)
    #[arg(long, env = "PARLEY_DISABLE_SPEECH")]
    disable_speech: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Synthesize and speak a line of text
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Run the HTTP API without the interactive shell
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Say { text } => say(&text).await,
            Command::Serve => serve(cli.port).await,
        };
    }

    let mut config = Config::from_env()?;
    if cli.disable_speech {
        config.voice.tts_enabled = false;
    }

    let engine = build_engine(&config)?;
    let transcriber = build_transcriber(&config)?;
    let synthesizer = build_synthesizer(&config)?;

    let sink: Arc<dyn AudioSink> = Arc::new(CpalSink::new(TTS_SAMPLE_RATE)?);
    let session = Session::new(&config);

    tracing::info!(
        session_id = %session.session_id,
        model = %config.llm.model,
        stt_model = %session.stt_model,
        tts_enabled = session.tts_enabled,
        "parley starting"
    );

    // HTTP API runs alongside the shell
    let api = parley::api::ApiServer::new(Arc::clone(&engine), cli.port);
    let api_handle = api.spawn();

    let orchestrator = Orchestrator::new(engine, transcriber, synthesizer, sink, session);
    let capture = AudioCapture::new()?;

    run_shell(orchestrator, capture, config).await?;

    api_handle.abort();
    Ok(())
}

/// Assemble the dialogue engine from configuration
fn build_engine(config: &Config) -> anyhow::Result<Arc<DialogueEngine>> {
    let backend = OpenAiBackend::new(
        config.llm.base_url.clone(),
        config.llm_api_key().unwrap_or_default().to_string(),
        config.llm.model.clone(),
        config.llm.max_tokens,
    )?;

    let backend: Arc<dyn ChatBackend> = Arc::new(backend);
    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new());
    let retriever: Arc<dyn ContextRetriever> = Arc::new(StaticContextRetriever::new(
        std::env::var("PARLEY_CONTEXT").unwrap_or_default(),
    ));
    let tools = Arc::new(ToolRegistry::with_builtins());

    Ok(Arc::new(DialogueEngine::new(
        backend, store, retriever, tools,
    )))
}

/// Pick the transcription provider from available keys
fn build_transcriber(config: &Config) -> anyhow::Result<Arc<dyn Transcriber>> {
    let voice = &config.voice;

    if let Some(key) = &config.api_keys.deepgram
        && !voice.stt_model.starts_with("whisper")
    {
        let stt = SpeechToText::new_deepgram(
            key.clone(),
            voice.stt_model.clone(),
            voice.language.clone(),
        )?;
        return Ok(Arc::new(stt));
    }

    let stt = SpeechToText::new_whisper(
        config.api_keys.openai.clone().unwrap_or_default(),
        voice.stt_model.clone(),
        voice.language.clone(),
    )?;
    Ok(Arc::new(stt))
}

/// Pick the synthesis provider from available keys; `None` when no
/// TTS-capable key is configured
fn build_synthesizer(config: &Config) -> anyhow::Result<Option<Arc<dyn Synthesizer>>> {
    let voice = &config.voice;

    if let Some(key) = &config.api_keys.elevenlabs {
        let tts =
            SpeechSynthesis::new_elevenlabs(key.clone(), voice.tts_voice.clone(), voice.tts_model.clone())?;
        return Ok(Some(Arc::new(tts)));
    }

    if let Some(key) = &config.api_keys.openai {
        #[allow(clippy::cast_possible_truncation)]
        let speed = voice.tts_speed as f32;
        let tts = SpeechSynthesis::new_openai(
            key.clone(),
            voice.tts_voice.clone(),
            speed,
            voice.tts_model.clone(),
        )?;
        return Ok(Some(Arc::new(tts)));
    }

    tracing::warn!("no TTS-capable API key configured, replies will be text only");
    Ok(None)
}

/// Interactive shell: Enter records a turn, numbers set the recording
/// duration, mute/unmute toggle speech, quit exits
#[allow(clippy::future_not_send)]
async fn run_shell(
    mut orchestrator: Orchestrator,
    mut capture: AudioCapture,
    mut config: Config,
) -> anyhow::Result<()> {
    println!("Parley ready!");
    println!("Commands:");
    println!("  Enter         record and run a turn");
    println!("  <number>      set recording duration (seconds)");
    println!("  mute          disable spoken replies");
    println!("  unmute        enable spoken replies");
    println!("  model <name>  switch the STT model");
    println!("  quit          exit");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nPress Enter to record (or 'quit' to exit): ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "mute" => {
                orchestrator.session_mut().tts_enabled = false;
                println!("Spoken replies disabled.");
            }
            "unmute" => {
                orchestrator.session_mut().tts_enabled = true;
                println!("Spoken replies enabled.");
            }
            "" => {
                orchestrator.run_turn(&mut capture).await;
            }
            input => {
                if let Some(model) = input.strip_prefix("model ") {
                    let model = model.trim();
                    if model.is_empty() {
                        println!("Usage: model <name>");
                        continue;
                    }
                    config.voice.stt_model = model.to_string();
                    match build_transcriber(&config) {
                        Ok(transcriber) => {
                            orchestrator.set_transcriber(transcriber);
                            orchestrator.session_mut().stt_model = model.to_string();
                            println!("STT model set to {model}.");
                        }
                        Err(e) => println!("Could not switch model: {e}"),
                    }
                } else if let Ok(secs) = input.parse::<u64>() {
                    if secs == 0 {
                        println!("Recording duration must be at least 1 second.");
                    } else {
                        orchestrator.session_mut().set_recording_secs(secs);
                        println!("Recording duration set to {secs} seconds.");
                    }
                } else {
                    println!("Unknown command: {input}");
                }
            }
        }
    }

    Ok(())
}

/// Run the HTTP API alone
async fn serve(port: u16) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let engine = build_engine(&config)?;
    parley::api::ApiServer::new(engine, port).run().await?;
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalSink::new(TTS_SAMPLE_RATE)?;

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let num_samples = (TTS_SAMPLE_RATE as f32 * duration_secs) as usize;

    // i16 little-endian PCM, 30% volume
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let pcm: Vec<u8> = (0..num_samples)
        .flat_map(|i| {
            let t = i as f32 / TTS_SAMPLE_RATE as f32;
            let sample = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3;
            ((sample * 32767.0) as i16).to_le_bytes()
        })
        .collect();

    println!("Playing {num_samples} samples at {TTS_SAMPLE_RATE} Hz...");
    sink.play(&pcm).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Synthesize text and play it
async fn say(text: &str) -> anyhow::Result<()> {
    println!("Synthesizing: \"{text}\"\n");

    let config = Config::from_env()?;
    let Some(synthesizer) = build_synthesizer(&config)? else {
        anyhow::bail!("no TTS-capable API key configured");
    };

    let pcm = synthesizer.synthesize(text).await?;
    println!("Got {} bytes of PCM audio", pcm.len());

    let sink = CpalSink::new(synthesizer.sample_rate())?;
    sink.play(&pcm).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
