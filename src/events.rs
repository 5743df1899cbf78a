//! Session events broadcast to subscribers.
//!
//! Serialized as camelCase JSON so frontends can consume them directly.

use serde::{Deserialize, Serialize};

use crate::buffering::chunk::CutReason;

/// Lifecycle state of the engine's single session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session; the engine is waiting for `start_session`.
    Idle,
    /// Capturing and dispatching chunks.
    Armed,
    /// `stop_session` was called; the remainder is being flushed.
    Draining,
}

/// Emitted whenever the session state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub state: SessionState,
    /// Human-readable context ("device opened", "flush complete", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Emitted once per transcribed chunk, in dispatch order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEvent {
    /// 0-based position of the chunk within its session.
    pub seq: u64,
    /// Recognized text; empty when transcription failed or heard nothing.
    pub text: String,
    pub reason: CutReason,
    pub duration_secs: f64,
    /// Language the backend reported, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_event_serializes_camel_case() {
        let event = ChunkEvent {
            seq: 3,
            text: "hello".to_string(),
            reason: CutReason::MaxBuffer,
            duration_secs: 12.5,
            language: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"seq":3,"text":"hello","reason":"max_buffer","durationSecs":12.5}"#
        );
    }

    #[test]
    fn status_event_round_trips() {
        let event = SessionStatusEvent {
            state: SessionState::Draining,
            detail: Some("flush".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""state":"draining""#));
        let back: SessionStatusEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state, SessionState::Draining);
    }
}
