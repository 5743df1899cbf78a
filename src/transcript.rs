//! Session-scoped transcript accumulation and decode-context derivation.

/// Collects per-chunk text in arrival order and hands out a bounded tail of
/// the accumulated transcript as decode context for the next chunk.
#[derive(Debug)]
pub struct TranscriptAccumulator {
    text: String,
    max_prompt_chars: usize,
}

impl TranscriptAccumulator {
    pub fn new(max_prompt_chars: usize) -> Self {
        Self {
            text: String::new(),
            max_prompt_chars,
        }
    }

    /// Append one chunk's text. Empty or whitespace-only text is dropped so
    /// failed chunks never introduce stray separators.
    pub fn append(&mut self, chunk_text: &str) {
        let trimmed = chunk_text.trim();
        if trimmed.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(trimmed);
    }

    /// Decode context for the next chunk: the trailing `max_prompt_chars`
    /// characters of the transcript so far, or `None` before any text has
    /// accumulated.
    ///
    /// Must be called *before* appending the current chunk's text — the
    /// chunk being decoded is not part of its own context.
    pub fn context_for_next(&self) -> Option<String> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let chars: Vec<char> = trimmed.chars().collect();
        let start = chars.len().saturating_sub(self.max_prompt_chars);
        Some(chars[start..].iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Consume the accumulator and return the final transcript, trimmed.
    pub fn finalize(self) -> String {
        self.text.trim().to_string()
    }
}
