//! Streaming audio playback queue
//!
//! Synthesized sentences are enqueued as PCM chunks and played strictly
//! in order by a background worker. The worker polls on a short
//! interval so a stop request takes effect promptly even while the
//! queue is waiting for audio to arrive.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Queue poll interval; bounds how long cancellation can lag
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One synthesized sentence queued for playback
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw PCM bytes (i16 little-endian, mono)
    pub pcm: Vec<u8>,
    /// Sample rate of the PCM payload
    pub sample_rate: u32,
    /// Sentence sequence number, for logging
    pub sequence: u64,
}

/// Plays one PCM chunk to completion
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play raw PCM bytes (i16 little-endian, mono)
    ///
    /// # Errors
    ///
    /// Returns error if the output device fails
    async fn play(&self, pcm: &[u8]) -> Result<()>;
}

/// Ordered playback queue over an [`AudioSink`]
pub struct PlaybackSession {
    sink: Arc<dyn AudioSink>,
    pending: Arc<AtomicUsize>,
    worker: Option<Worker>,
}

struct Worker {
    tx: mpsc::UnboundedSender<AudioChunk>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PlaybackSession {
    /// Create a session over the given sink; call [`start`](Self::start)
    /// before enqueueing
    #[must_use]
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            pending: Arc::new(AtomicUsize::new(0)),
            worker: None,
        }
    }

    /// Start the playback worker; a no-op if already running
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_queue(
            Arc::clone(&self.sink),
            rx,
            cancel.clone(),
            Arc::clone(&self.pending),
        ));

        self.worker = Some(Worker { tx, cancel, handle });
        tracing::debug!("playback queue started");
    }

    /// Enqueue a chunk for in-order playback
    ///
    /// # Errors
    ///
    /// Returns error if the queue is not running
    pub fn enqueue(&self, chunk: AudioChunk) -> Result<()> {
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| Error::Playback("playback queue not started".to_string()))?;

        self.pending.fetch_add(1, Ordering::SeqCst);
        worker.tx.send(chunk).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            Error::Playback("playback queue closed".to_string())
        })
    }

    /// Stop the queue, discarding any chunks not yet played
    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel.cancel();
            drop(worker.tx);
            let _ = worker.handle.await;
            self.pending.store(0, Ordering::SeqCst);
            tracing::debug!("playback queue stopped");
        }
    }

    /// Wait until all enqueued chunks have played, up to `grace`
    pub async fn wait_idle(&self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        while self.pending.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    pending = self.pending.load(Ordering::SeqCst),
                    "grace period elapsed with chunks still pending"
                );
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Whether the worker is running
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Number of chunks enqueued but not yet played
    #[must_use]
    pub fn pending_chunks(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Worker loop: play chunks in arrival order until cancelled or the
/// channel closes
async fn run_queue(
    sink: Arc<dyn AudioSink>,
    mut rx: mpsc::UnboundedReceiver<AudioChunk>,
    cancel: CancellationToken,
    pending: Arc<AtomicUsize>,
) {
    loop {
        if cancel.is_cancelled() {
            // Drain without playing so pending reaches zero
            while rx.try_recv().is_ok() {
                pending.fetch_sub(1, Ordering::SeqCst);
            }
            break;
        }

        match tokio::time::timeout(POLL_INTERVAL, rx.recv()).await {
            Ok(Some(chunk)) => {
                if cancel.is_cancelled() {
                    pending.fetch_sub(1, Ordering::SeqCst);
                    continue;
                }

                if let Err(e) = sink.play(&chunk.pcm).await {
                    tracing::error!(
                        error = %e,
                        sequence = chunk.sequence,
                        "audio sink failed, aborting playback queue"
                    );
                    pending.fetch_sub(1, Ordering::SeqCst);
                    cancel.cancel();
                    continue;
                }

                tracing::debug!(
                    sequence = chunk.sequence,
                    bytes = chunk.pcm.len(),
                    sample_rate = chunk.sample_rate,
                    "chunk played"
                );
                pending.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(None) => break,
            Err(_) => {}
        }
    }

    tracing::debug!("playback queue worker exited");
}

/// Sink over the default output device via cpal
pub struct CpalSink {
    config: StreamConfig,
    sample_rate: u32,
}

impl CpalSink {
    /// Create a sink for mono PCM at the given sample rate
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device is available
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Playback(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
            .ok_or_else(|| Error::Playback("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            sample_rate,
        })
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, pcm: &[u8]) -> Result<()> {
        let samples = pcm_to_samples(pcm);
        if samples.is_empty() {
            return Ok(());
        }

        let config = self.config.clone();
        let sample_rate = self.sample_rate;

        // cpal streams are not Send; the device is opened and driven
        // entirely on a blocking thread.
        tokio::task::spawn_blocking(move || play_samples_blocking(&config, &samples, sample_rate))
            .await
            .map_err(|e| Error::Playback(e.to_string()))?
    }
}

/// Decode i16 little-endian PCM bytes to f32 samples
fn pcm_to_samples(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect()
}

/// Play samples to the default output device, blocking until done
fn play_samples_blocking(config: &StreamConfig, samples: &[f32], sample_rate: u32) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device".to_string()))?;

    let channels = config.channels as usize;

    let samples = Arc::new(samples.to_vec());
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let samples_cb = Arc::clone(&samples);
    let position_cb = Arc::clone(&position);
    let finished_cb = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let pos = position_cb.load(Ordering::Relaxed);
                    let sample = if pos < samples_cb.len() {
                        position_cb.store(pos + 1, Ordering::Relaxed);
                        samples_cb[pos]
                    } else {
                        finished_cb.store(true, Ordering::Relaxed);
                        0.0
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Playback(e.to_string()))?;

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    // Poll for completion with a timeout derived from clip length
    let duration_ms = (samples.len() as u64 * 1000) / u64::from(sample_rate);
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Relaxed) {
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    // Small delay to let the device flush
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = samples.len(), "playback complete");

    Ok(())
}
