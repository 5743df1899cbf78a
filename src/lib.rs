//! # sotto
//!
//! Push-to-talk streaming dictation engine.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → block queue → session loop (spawn_blocking)
//!                                                │
//!                                     Segmenter (silence / max-buffer cuts)
//!                                                │
//!                                      ConditioningPipeline
//!                                                │
//!                                      Transcriber::transcribe
//!                                                │
//!                             TranscriptAccumulator + broadcast::Sender<ChunkEvent>
//! ```
//!
//! The capture callback only downmixes, resamples, and enqueues. All other
//! work happens on the session's blocking thread, so chunks are conditioned
//! and transcribed while the next one is still being recorded.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod events;
pub mod stt;
pub mod transcript;
pub mod vad;

/// Sample rate every stage downstream of capture runs at (Hz).
pub const SAMPLE_RATE: u32 = 16_000;

// Convenience re-exports for downstream crates
pub use buffering::chunk::{Chunk, ConditionedChunk, CutReason, SampleBlock};
pub use engine::{SessionConfig, SottoEngine};
pub use error::SottoError;
pub use events::{ChunkEvent, SessionState, SessionStatusEvent};
pub use stt::{DecodeOptions, Recognition, Transcriber, TranscriberHandle};
