//! `StubTranscriber` — placeholder backend that echoes metadata without real
//! inference. Lets the full capture → segment → condition → accumulate chain
//! be exercised end-to-end before a real recognizer is wired in.

use tracing::debug;

use crate::buffering::chunk::ConditionedChunk;
use crate::error::Result;
use crate::stt::{DecodeOptions, Recognition, Transcriber};

/// Echo-style stub backend.
///
/// For every chunk of non-trivial length it returns
/// `"[stub: <N> samples @ <SR> Hz]"` at full confidence.
pub struct StubTranscriber {
    chunk_count: u32,
}

impl StubTranscriber {
    pub fn new() -> Self {
        Self { chunk_count: 0 }
    }
}

impl Default for StubTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcriber for StubTranscriber {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubTranscriber::warm_up — no-op");
        Ok(())
    }

    fn transcribe(
        &mut self,
        chunk: &ConditionedChunk,
        context: Option<&str>,
        _options: &DecodeOptions,
    ) -> Result<Recognition> {
        if chunk.samples.len() < 160 {
            return Ok(Recognition::default());
        }

        self.chunk_count += 1;
        debug!(
            chunk = self.chunk_count,
            context_chars = context.map_or(0, str::len),
            "stub transcription"
        );

        Ok(Recognition {
            text: format!(
                "[stub: {} samples @ {} Hz]",
                chunk.samples.len(),
                chunk.sample_rate
            ),
            language: Some("en".to_string()),
            confidence: Some(1.0),
        })
    }
}
