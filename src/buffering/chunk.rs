//! Typed audio containers passed between the pipeline stages.

use serde::{Deserialize, Serialize};

/// One callback delivery of mono f32 samples at the pipeline rate.
///
/// Immutable once created; ownership transfers from the capture callback to
/// the block queue and then to the consumer role.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
}

impl SampleBlock {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Why a chunk boundary was placed where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutReason {
    /// A qualifying run of silent windows was found.
    Silence,
    /// The pending buffer hit the hard size cap before any silence did.
    MaxBuffer,
    /// Remainder flushed when the session stopped.
    EndOfRecording,
}

/// A finalized span of audio dispatched for conditioning and transcription.
///
/// Never mutated after creation.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    pub reason: CutReason,
}

impl Chunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32, reason: CutReason) -> Self {
        Self {
            samples,
            sample_rate,
            reason,
        }
    }

    /// Duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Output of the conditioning pipeline. Same sample count and rate as the
/// input `Chunk` — the pipeline is not permitted to change segment length.
#[derive(Debug, Clone)]
pub struct ConditionedChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// The consumer's working accumulation of un-dispatched samples.
///
/// Owned exclusively by the consumer role; append-only until a cut point is
/// identified, then split into {dispatched samples, retained remainder}.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    samples: Vec<f32>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, block: &SampleBlock) {
        self.samples.extend_from_slice(&block.samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    /// Split off the first `cut` samples, retaining the remainder.
    ///
    /// After the split `self.len()` equals the original length minus `cut`;
    /// no samples are lost or duplicated across the boundary.
    pub fn split_off_front(&mut self, cut: usize) -> Vec<f32> {
        debug_assert!(cut <= self.samples.len());
        let front: Vec<f32> = self.samples.drain(..cut).collect();
        front
    }

    /// Take the entire remaining buffer, leaving it empty.
    pub fn take_all(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }
}
