//! `SottoEngine` — top-level session lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! SottoEngine::new()
//!     └─► warm_up()           → backend loaded, state = idle
//!         └─► start_session() → device open, consumer spawned, state = armed
//!             └─► stop_session() → armed=false, remainder flushed,
//!                                  final transcript returned, state = idle
//! ```
//!
//! `start_session()` is re-entrant: calling it while a session is armed is a
//! no-op, so a key-repeat storm from the push-to-talk hotkey cannot spawn
//! duplicate sessions. `stop_session()` while idle returns an empty
//! transcript.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity). `AudioCapture` is therefore created *inside* the
//! `spawn_blocking` closure so it never crosses a thread boundary. A sync
//! channel propagates any open-device error back to the `start_session()`
//! caller.

pub mod session;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::AudioCapture,
    buffering::create_block_queue,
    dsp::{ConditioningPipeline, DspConfig},
    error::{Result, SottoError},
    events::{ChunkEvent, SessionState, SessionStatusEvent},
    stt::{DecodeOptions, TranscriberHandle},
};

/// Broadcast channel capacity for chunk and status events.
const BROADCAST_CAP: usize = 256;

/// Configuration for one engine instance. Applied at `start_session()`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sample rate every stage downstream of capture runs at (Hz).
    pub pipeline_sample_rate: u32,
    /// RMS level below which a 100 ms window counts as silent.
    pub rms_threshold: f32,
    /// Consecutive silence required for a chunk boundary (seconds).
    pub silence_window_secs: f32,
    /// Silence cuts may not produce chunks shorter than this (seconds).
    pub min_chunk_secs: f32,
    /// Hard cap on pending audio before a forced cut (seconds).
    pub max_buffer_secs: f32,
    /// Character budget for the decode-context tail.
    pub max_prompt_chars: usize,
    /// Language hint forwarded to the backend; `None` auto-detects.
    pub language: Option<String>,
    /// Input device name override; `None` uses the system default.
    pub preferred_input_device: Option<String>,
    pub dsp: DspConfig,
    pub decode: DecodeOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pipeline_sample_rate: crate::SAMPLE_RATE,
            rms_threshold: 0.005,
            silence_window_secs: 1.5,
            min_chunk_secs: 10.0,
            max_buffer_secs: 20.0,
            max_prompt_chars: 50,
            language: None,
            preferred_input_device: None,
            dsp: DspConfig::default(),
            decode: DecodeOptions::default(),
        }
    }
}

impl SessionConfig {
    /// Reject configurations the segmenter cannot operate under.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline_sample_rate == 0 {
            return Err(SottoError::Config("pipeline_sample_rate must be > 0".into()));
        }
        if self.rms_threshold <= 0.0 {
            return Err(SottoError::Config("rms_threshold must be > 0".into()));
        }
        if self.silence_window_secs <= 0.0 {
            return Err(SottoError::Config("silence_window_secs must be > 0".into()));
        }
        if self.min_chunk_secs < 0.0 {
            return Err(SottoError::Config("min_chunk_secs must be >= 0".into()));
        }
        if self.max_buffer_secs <= self.min_chunk_secs {
            return Err(SottoError::Config(
                "max_buffer_secs must exceed min_chunk_secs".into(),
            ));
        }
        // The cap must cover at least one sample, or the forced cut could
        // never consume anything.
        if self.max_buffer_secs * (self.pipeline_sample_rate as f32) < 1.0 {
            return Err(SottoError::Config(
                "max_buffer_secs must cover at least one sample".into(),
            ));
        }
        Ok(())
    }
}

/// The top-level engine handle.
///
/// `SottoEngine` is `Send + Sync` — all fields use interior mutability. Wrap
/// in `Arc<SottoEngine>` to share between hotkey handlers and
/// event-forwarding tasks.
pub struct SottoEngine {
    config: SessionConfig,
    transcriber: TranscriberHandle,
    /// `true` while a session is capturing.
    armed: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
    chunk_tx: broadcast::Sender<ChunkEvent>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    stats: Arc<session::SessionStats>,
    /// Receiver for the final transcript of the in-flight session.
    transcript_rx: Mutex<Option<std::sync::mpsc::Receiver<String>>>,
}

impl SottoEngine {
    /// Create a new engine. Does not touch audio — call `warm_up()` then
    /// `start_session()`.
    pub fn new(config: SessionConfig, transcriber: TranscriberHandle) -> Self {
        let (chunk_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            transcriber,
            armed: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            chunk_tx,
            status_tx,
            stats: Arc::new(session::SessionStats::default()),
            transcript_rx: Mutex::new(None),
        }
    }

    /// Warm up the transcription backend. Call once at startup.
    pub fn warm_up(&self) -> Result<()> {
        info!("warming up transcription backend");
        self.transcriber.0.lock().warm_up()?;
        info!("transcription backend ready");
        Ok(())
    }

    /// Arm a recording session: open the input device and spawn the consumer.
    ///
    /// Blocks until the device is confirmed open (or fails), then returns
    /// while capture continues on a background blocking thread. Calling this
    /// while a session is already armed is a no-op.
    ///
    /// # Errors
    /// - `SottoError::Config` when the configuration is invalid.
    /// - `SottoError::NoDefaultInputDevice` / `SottoError::AudioStream` on
    ///   device failure.
    pub fn start_session(&self) -> Result<()> {
        if self.armed.swap(true, Ordering::SeqCst) {
            warn!("start_session while armed — ignoring");
            return Ok(());
        }

        if let Err(e) = self.config.validate() {
            self.armed.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.stats.reset();
        self.set_state(SessionState::Armed, None);

        let (block_tx, block_rx) = create_block_queue();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<String>();
        *self.transcript_rx.lock() = Some(done_rx);

        let config = self.config.clone();
        let transcriber = self.transcriber.clone();
        let armed = Arc::clone(&self.armed);
        let chunk_tx = self.chunk_tx.clone();
        let status_tx = self.status_tx.clone();
        let state = Arc::clone(&self.state);
        let stats = Arc::clone(&self.stats);

        // Sync oneshot: the blocking thread reports open success (with the
        // device rate) or failure back to this caller.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            // Device open must happen on THIS thread — cpal::Stream is !Send.
            let capture = match AudioCapture::open_with_preference(
                block_tx,
                Arc::clone(&armed),
                config.preferred_input_device.as_deref(),
                config.pipeline_sample_rate,
            ) {
                Ok(capture) => {
                    let _ = open_tx.send(Ok(capture.device_sample_rate));
                    capture
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    armed.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let conditioning = ConditioningPipeline::new(config.dsp.clone());
            let transcript = session::run(session::SessionContext {
                config,
                transcriber,
                conditioning,
                blocks: block_rx,
                armed,
                chunk_tx,
                stats,
            });

            *state.lock() = SessionState::Idle;
            let _ = status_tx.send(SessionStatusEvent {
                state: SessionState::Idle,
                detail: Some("session complete".into()),
            });
            let _ = done_tx.send(transcript);

            // Stream drops here, releasing the device on this thread.
            drop(capture);
        });

        match open_rx.recv() {
            Ok(Ok(device_rate)) => {
                info!(device_rate, "session armed — capturing");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(SessionState::Idle, Some(e.to_string()));
                *self.transcript_rx.lock() = None;
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent.
                self.armed.store(false, Ordering::SeqCst);
                self.set_state(SessionState::Idle, Some("session failed to start".into()));
                *self.transcript_rx.lock() = None;
                Err(SottoError::Other(anyhow::anyhow!(
                    "session task died unexpectedly"
                )))
            }
        }
    }

    /// Disarm the session, wait for the flush to finish, and return the
    /// session's full transcript. Returns an empty string when no session is
    /// armed.
    pub fn stop_session(&self) -> Result<String> {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return Ok(String::new());
        }

        self.set_state(SessionState::Draining, None);
        info!("session stop requested — draining");

        let drain_started = std::time::Instant::now();
        let receiver = self.transcript_rx.lock().take();
        let transcript = match receiver {
            Some(rx) => rx.recv().map_err(|_| {
                SottoError::Other(anyhow::anyhow!("session ended without a transcript"))
            })?,
            None => String::new(),
        };

        let snap = self.stats.snapshot();
        info!(
            transcript_chars = transcript.chars().count(),
            chunks = snap.chunks_emitted,
            silence_cuts = snap.silence_cuts,
            max_buffer_cuts = snap.max_buffer_cuts,
            drain_ms = drain_started.elapsed().as_millis() as u64,
            "session complete"
        );
        Ok(transcript)
    }

    /// Current session state (snapshot).
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Subscribe to per-chunk transcription events.
    pub fn subscribe_chunks(&self) -> broadcast::Receiver<ChunkEvent> {
        self.chunk_tx.subscribe()
    }

    /// Subscribe to session state change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of session counters for observability.
    pub fn stats_snapshot(&self) -> session::StatsSnapshot {
        self.stats.snapshot()
    }

    fn set_state(&self, new_state: SessionState, detail: Option<String>) {
        *self.state.lock() = new_state;
        let _ = self.status_tx.send(SessionStatusEvent {
            state: new_state,
            detail,
        });
    }
}
