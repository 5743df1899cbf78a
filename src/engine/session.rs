//! Blocking session consumer loop.
//!
//! ## Per-iteration stages
//!
//! ```text
//! 1. Pop one SampleBlock from the queue (10 ms timeout)
//! 2. Append to the pending buffer and look for cut points:
//!    a. Latest qualifying silence run  → Silence chunk
//!    b. Pending ≥ max_buffer_samples   → MaxBuffer chunk at exactly the cap
//! 3. For each finalized chunk: condition → transcribe → accumulate
//! 4. On disarm/disconnect: drain stragglers, flush remainder as
//!    EndOfRecording, return the final transcript
//! ```
//!
//! The whole loop runs in `spawn_blocking`, keeping the Tokio executor free
//! for event forwarding and control calls.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    buffering::{
        chunk::{Chunk, ConditionedChunk, CutReason, PendingBuffer, SampleBlock},
        BlockReceiver,
    },
    dsp::ConditioningPipeline,
    engine::SessionConfig,
    events::ChunkEvent,
    stt::{DecodeOptions, Recognition, TranscriberHandle},
    transcript::TranscriptAccumulator,
    vad::SilenceDetector,
};

/// How long one queue pop may wait before the loop re-checks the armed flag.
const POP_TIMEOUT: Duration = Duration::from_millis(10);

pub struct SessionStats {
    pub blocks_in: AtomicUsize,
    pub samples_in: AtomicUsize,
    pub silence_cuts: AtomicUsize,
    pub max_buffer_cuts: AtomicUsize,
    pub flush_cuts: AtomicUsize,
    pub conditioning_fallbacks: AtomicUsize,
    pub transcription_errors: AtomicUsize,
    pub chunks_emitted: AtomicUsize,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            blocks_in: AtomicUsize::new(0),
            samples_in: AtomicUsize::new(0),
            silence_cuts: AtomicUsize::new(0),
            max_buffer_cuts: AtomicUsize::new(0),
            flush_cuts: AtomicUsize::new(0),
            conditioning_fallbacks: AtomicUsize::new(0),
            transcription_errors: AtomicUsize::new(0),
            chunks_emitted: AtomicUsize::new(0),
        }
    }
}

impl SessionStats {
    pub fn reset(&self) {
        self.blocks_in.store(0, Ordering::Relaxed);
        self.samples_in.store(0, Ordering::Relaxed);
        self.silence_cuts.store(0, Ordering::Relaxed);
        self.max_buffer_cuts.store(0, Ordering::Relaxed);
        self.flush_cuts.store(0, Ordering::Relaxed);
        self.conditioning_fallbacks.store(0, Ordering::Relaxed);
        self.transcription_errors.store(0, Ordering::Relaxed);
        self.chunks_emitted.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks_in: self.blocks_in.load(Ordering::Relaxed),
            samples_in: self.samples_in.load(Ordering::Relaxed),
            silence_cuts: self.silence_cuts.load(Ordering::Relaxed),
            max_buffer_cuts: self.max_buffer_cuts.load(Ordering::Relaxed),
            flush_cuts: self.flush_cuts.load(Ordering::Relaxed),
            conditioning_fallbacks: self.conditioning_fallbacks.load(Ordering::Relaxed),
            transcription_errors: self.transcription_errors.load(Ordering::Relaxed),
            chunks_emitted: self.chunks_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub blocks_in: usize,
    pub samples_in: usize,
    pub silence_cuts: usize,
    pub max_buffer_cuts: usize,
    pub flush_cuts: usize,
    pub conditioning_fallbacks: usize,
    pub transcription_errors: usize,
    pub chunks_emitted: usize,
}

/// Streaming segmentation over the pending buffer.
///
/// Pure sample-in / chunk-out state machine, kept separate from the consumer
/// loop so the no-sample-lost property can be tested without threads.
pub struct Segmenter {
    detector: SilenceDetector,
    max_buffer_samples: usize,
    sample_rate: u32,
    pending: PendingBuffer,
}

impl Segmenter {
    pub fn new(config: &SessionConfig) -> Self {
        let detector = SilenceDetector::new(
            config.rms_threshold,
            config.silence_window_secs,
            config.min_chunk_secs,
            config.pipeline_sample_rate,
        );
        // Floor of one sample so a degenerate cap can never stall the cut
        // loop on an empty split.
        let max_buffer_samples =
            ((config.max_buffer_secs * config.pipeline_sample_rate as f32) as usize).max(1);
        Self {
            detector,
            max_buffer_samples,
            sample_rate: config.pipeline_sample_rate,
            pending: PendingBuffer::new(),
        }
    }

    /// Absorb one block; return every chunk it finalizes, in cut order.
    pub fn push(&mut self, block: &SampleBlock) -> Vec<Chunk> {
        self.pending.append(block);

        let mut chunks = Vec::new();
        loop {
            // Silence takes priority; a cut at index 0 would produce an
            // empty chunk and is never taken.
            let silence_cut = self
                .detector
                .find_cut(self.pending.as_slice())
                .filter(|&cut| cut > 0);
            if let Some(cut) = silence_cut {
                let samples = self.pending.split_off_front(cut);
                chunks.push(Chunk::new(samples, self.sample_rate, CutReason::Silence));
                continue;
            }

            if self.pending.len() >= self.max_buffer_samples {
                let samples = self.pending.split_off_front(self.max_buffer_samples);
                chunks.push(Chunk::new(samples, self.sample_rate, CutReason::MaxBuffer));
                continue;
            }

            break;
        }
        chunks
    }

    /// Finalize whatever remains as an end-of-recording chunk.
    pub fn flush(&mut self) -> Option<Chunk> {
        if self.pending.is_empty() {
            return None;
        }
        let samples = self.pending.take_all();
        Some(Chunk::new(
            samples,
            self.sample_rate,
            CutReason::EndOfRecording,
        ))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// All context the session loop needs, passed as one struct so the closure
/// stays tidy.
pub struct SessionContext {
    pub config: SessionConfig,
    pub transcriber: TranscriberHandle,
    pub conditioning: ConditioningPipeline,
    pub blocks: BlockReceiver,
    pub armed: Arc<AtomicBool>,
    pub chunk_tx: broadcast::Sender<ChunkEvent>,
    pub stats: Arc<SessionStats>,
}

/// Run the blocking session loop until disarm (or producer disconnect), then
/// flush and return the final transcript.
pub fn run(ctx: SessionContext) -> String {
    info!("session loop started");

    let mut segmenter = Segmenter::new(&ctx.config);
    let mut accumulator = TranscriptAccumulator::new(ctx.config.max_prompt_chars);
    let mut seq = 0u64;

    loop {
        match ctx.blocks.recv_timeout(POP_TIMEOUT) {
            Ok(block) => {
                ctx.stats.blocks_in.fetch_add(1, Ordering::Relaxed);
                ctx.stats
                    .samples_in
                    .fetch_add(block.len(), Ordering::Relaxed);
                for chunk in segmenter.push(&block) {
                    dispatch_chunk(&ctx, &mut accumulator, &mut seq, chunk);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !ctx.armed.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Stragglers queued around the disarm: a capture callback that loaded
    // the armed flag just before it cleared may still be enqueueing, so keep
    // draining until the queue stays quiet for a full pop timeout.
    while let Ok(block) = ctx.blocks.recv_timeout(POP_TIMEOUT) {
        ctx.stats.blocks_in.fetch_add(1, Ordering::Relaxed);
        ctx.stats
            .samples_in
            .fetch_add(block.len(), Ordering::Relaxed);
        for chunk in segmenter.push(&block) {
            dispatch_chunk(&ctx, &mut accumulator, &mut seq, chunk);
        }
    }

    if let Some(chunk) = segmenter.flush() {
        dispatch_chunk(&ctx, &mut accumulator, &mut seq, chunk);
    }

    let snap = ctx.stats.snapshot();
    info!(
        blocks_in = snap.blocks_in,
        samples_in = snap.samples_in,
        silence_cuts = snap.silence_cuts,
        max_buffer_cuts = snap.max_buffer_cuts,
        flush_cuts = snap.flush_cuts,
        conditioning_fallbacks = snap.conditioning_fallbacks,
        transcription_errors = snap.transcription_errors,
        chunks_emitted = snap.chunks_emitted,
        "session loop stopped — stats"
    );

    accumulator.finalize()
}

/// Condition, transcribe, and accumulate one chunk. Per-chunk failures are
/// absorbed here; only the chunk's text is lost, never the session.
fn dispatch_chunk(
    ctx: &SessionContext,
    accumulator: &mut TranscriptAccumulator,
    seq: &mut u64,
    chunk: Chunk,
) {
    match chunk.reason {
        CutReason::Silence => &ctx.stats.silence_cuts,
        CutReason::MaxBuffer => &ctx.stats.max_buffer_cuts,
        CutReason::EndOfRecording => &ctx.stats.flush_cuts,
    }
    .fetch_add(1, Ordering::Relaxed);

    let duration_secs = chunk.duration_secs();
    let started = Instant::now();

    let conditioned = match ctx.conditioning.process(&chunk) {
        Ok(conditioned) => conditioned,
        Err(e) => {
            ctx.stats
                .conditioning_fallbacks
                .fetch_add(1, Ordering::Relaxed);
            warn!(seq = *seq, error = %e, "conditioning failed — transcribing raw audio");
            ConditionedChunk {
                samples: chunk.samples.clone(),
                sample_rate: chunk.sample_rate,
            }
        }
    };

    // Context is the transcript tail *before* this chunk's text lands.
    let context = accumulator.context_for_next();
    let options = decode_options(&ctx.config);

    let recognition = {
        let mut transcriber = ctx.transcriber.0.lock();
        match transcriber.transcribe(&conditioned, context.as_deref(), &options) {
            Ok(recognition) => recognition,
            Err(e) => {
                ctx.stats
                    .transcription_errors
                    .fetch_add(1, Ordering::Relaxed);
                error!(seq = *seq, error = %e, "transcription failed — chunk text dropped");
                Recognition::default()
            }
        }
    };

    if duration_secs > 0.0 {
        let rtf = started.elapsed().as_secs_f64() / duration_secs;
        debug!(
            seq = *seq,
            reason = ?chunk.reason,
            duration_secs = format_args!("{duration_secs:.2}"),
            rtf = format_args!("{rtf:.3}"),
            text_chars = recognition.text.chars().count(),
            "chunk transcribed"
        );
    }

    accumulator.append(&recognition.text);
    ctx.stats.chunks_emitted.fetch_add(1, Ordering::Relaxed);

    let event = ChunkEvent {
        seq: *seq,
        text: recognition.text,
        reason: chunk.reason,
        duration_secs,
        language: recognition.language,
    };
    *seq += 1;
    let _ = ctx.chunk_tx.send(event);
}

fn decode_options(config: &SessionConfig) -> DecodeOptions {
    let mut options = config.decode.clone();
    if options.language.is_none() {
        options.language = config.language.clone();
    }
    options
}
