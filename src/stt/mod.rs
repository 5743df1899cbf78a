//! Transcription backend abstraction.
//!
//! The `Transcriber` trait decouples the session loop from any specific
//! recognizer (stub echo, local Whisper, remote service).
//!
//! `&mut self` on `transcribe` intentionally expresses that decoders are
//! stateful — beam caches, language detection state, etc. All mutation is
//! therefore serialised through `TranscriberHandle`'s `parking_lot::Mutex`.

pub mod stub;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::buffering::chunk::ConditionedChunk;
use crate::error::Result;

/// Decoding knobs forwarded verbatim to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecodeOptions {
    /// BCP-47 language hint; `None` lets the backend auto-detect.
    pub language: Option<String>,
    pub beam_size: u32,
    /// Segments with a mean log-probability below this are suppressed.
    pub log_prob_threshold: f32,
    /// No-speech probability above which a segment is treated as silence.
    pub no_speech_threshold: f32,
    /// Compression ratio above which a segment is treated as degenerate.
    pub compression_ratio_threshold: f32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            language: None,
            beam_size: 5,
            log_prob_threshold: -1.0,
            no_speech_threshold: 0.6,
            compression_ratio_threshold: 2.4,
        }
    }
}

/// One chunk's recognition result.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    /// Recognized text; empty when the backend heard nothing.
    pub text: String,
    /// Language the backend settled on, if it reports one.
    pub language: Option<String>,
    /// Backend confidence in [0, 1], if it reports one.
    pub confidence: Option<f32>,
}

/// Contract for transcription backends.
pub trait Transcriber: Send + 'static {
    /// One-time warm-up: load weights, run a priming inference. Called once
    /// before the first chunk of a session is dispatched.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be made ready.
    fn warm_up(&mut self) -> Result<()>;

    /// Transcribe one conditioned chunk.
    ///
    /// `context` is the tail of the transcript accumulated so far, offered
    /// as a decoding prompt; backends that cannot use it ignore it.
    fn transcribe(
        &mut self,
        chunk: &ConditionedChunk,
        context: Option<&str>,
        options: &DecodeOptions,
    ) -> Result<Recognition>;
}

/// Thread-safe reference-counted handle to any `Transcriber` implementor.
///
/// Uses `parking_lot::Mutex` for non-poisoning on panic.
#[derive(Clone)]
pub struct TranscriberHandle(pub Arc<Mutex<dyn Transcriber>>);

impl TranscriberHandle {
    /// Wrap any `Transcriber` in a `TranscriberHandle`.
    pub fn new<T: Transcriber>(transcriber: T) -> Self {
        Self(Arc::new(Mutex::new(transcriber)))
    }
}

impl std::fmt::Debug for TranscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriberHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_options_defaults() {
        let opts = DecodeOptions::default();
        assert_eq!(opts.language, None);
        assert_eq!(opts.beam_size, 5);
        assert!((opts.log_prob_threshold - -1.0).abs() < f32::EPSILON);
        assert!((opts.no_speech_threshold - 0.6).abs() < f32::EPSILON);
        assert!((opts.compression_ratio_threshold - 2.4).abs() < f32::EPSILON);
    }

    #[test]
    fn decode_options_deserialize_partial() {
        let opts: DecodeOptions =
            serde_json::from_str(r#"{"language":"en","beamSize":3}"#).unwrap();
        assert_eq!(opts.language.as_deref(), Some("en"));
        assert_eq!(opts.beam_size, 3);
        assert!((opts.no_speech_threshold - 0.6).abs() < f32::EPSILON);
    }
}
