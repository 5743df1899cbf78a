//! End-to-end streaming behavior: segmentation under realistic timings, the
//! session loop over a real queue and thread, and the no-sample-lost
//! guarantee across cut boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use sotto::buffering::chunk::{ConditionedChunk, CutReason, SampleBlock};
use sotto::buffering::create_block_queue;
use sotto::dsp::ConditioningPipeline;
use sotto::engine::session::{run, Segmenter, SessionContext, SessionStats};
use sotto::engine::SessionConfig;
use sotto::error::{Result, SottoError};
use sotto::events::ChunkEvent;
use sotto::stt::{DecodeOptions, Recognition, Transcriber, TranscriberHandle};
use sotto::SAMPLE_RATE;

const BLOCK: usize = 1_600; // 100 ms at 16 kHz

fn speech(secs: f32) -> Vec<f32> {
    let len = (secs * SAMPLE_RATE as f32) as usize;
    (0..len)
        .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

fn silence(secs: f32) -> Vec<f32> {
    vec![0.0; (secs * SAMPLE_RATE as f32) as usize]
}

fn feed(segmenter: &mut Segmenter, samples: &[f32]) -> Vec<sotto::Chunk> {
    let mut chunks = Vec::new();
    for block in samples.chunks(BLOCK) {
        chunks.extend(segmenter.push(&SampleBlock::new(block.to_vec())));
    }
    chunks
}

struct WordTranscriber {
    words: Vec<&'static str>,
    calls: Arc<Mutex<Vec<Option<String>>>>,
}

impl Transcriber for WordTranscriber {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn transcribe(
        &mut self,
        _chunk: &ConditionedChunk,
        context: Option<&str>,
        _options: &DecodeOptions,
    ) -> Result<Recognition> {
        let mut calls = self.calls.lock();
        calls.push(context.map(str::to_owned));
        let word = self
            .words
            .get(calls.len() - 1)
            .copied()
            .ok_or_else(|| SottoError::Transcription("script exhausted".into()))?;
        Ok(Recognition {
            text: word.to_string(),
            language: Some("en".into()),
            confidence: Some(1.0),
        })
    }
}

// ── Segmentation under production timings ────────────────────────────────

#[test]
fn long_pause_cuts_at_silence_and_flushes_rest() {
    // Default timings: 1.5 s silence window, 10 s minimum chunk.
    let mut segmenter = Segmenter::new(&SessionConfig::default());

    let mut samples = speech(12.0);
    samples.extend(silence(2.0));
    samples.extend(speech(3.0));

    let mut chunks = feed(&mut segmenter, &samples);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].reason, CutReason::Silence);
    // Streaming detection fires the moment 1.5 s of silence has accumulated,
    // so the cut lands at the start of that run: the 12 s mark.
    assert_eq!(chunks[0].samples.len(), 12 * SAMPLE_RATE as usize);

    chunks.extend(segmenter.flush());
    assert_eq!(chunks[1].reason, CutReason::EndOfRecording);
    let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
    assert_eq!(total, samples.len());
}

#[test]
fn continuous_speech_hits_the_buffer_cap_exactly() {
    let config = SessionConfig::default();
    let cap = (config.max_buffer_secs * SAMPLE_RATE as f32) as usize;
    let mut segmenter = Segmenter::new(&config);

    let samples = speech(25.0);
    let mut chunks = feed(&mut segmenter, &samples);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].reason, CutReason::MaxBuffer);
    assert_eq!(chunks[0].samples.len(), cap);

    chunks.extend(segmenter.flush());
    assert_eq!(chunks[1].reason, CutReason::EndOfRecording);
    assert_eq!(chunks[1].samples.len(), samples.len() - cap);
}

#[test]
fn mid_utterance_pause_yields_exactly_two_chunks() {
    let config = SessionConfig {
        silence_window_secs: 1.5,
        min_chunk_secs: 1.0,
        ..SessionConfig::default()
    };
    let mut segmenter = Segmenter::new(&config);

    let mut samples = speech(2.0);
    samples.extend(silence(2.0));
    samples.extend(speech(2.0));

    let mut chunks = feed(&mut segmenter, &samples);
    chunks.extend(segmenter.flush());

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].reason, CutReason::Silence);
    assert_eq!(chunks[0].samples.len(), 2 * SAMPLE_RATE as usize);
    assert_eq!(chunks[1].reason, CutReason::EndOfRecording);
    assert_eq!(
        chunks[0].samples.len() + chunks[1].samples.len(),
        samples.len()
    );
}

#[test]
fn short_pauses_do_not_fragment_speech() {
    // Pauses shorter than the silence window never cut.
    let mut segmenter = Segmenter::new(&SessionConfig::default());

    let mut samples = Vec::new();
    for _ in 0..6 {
        samples.extend(speech(2.0));
        samples.extend(silence(0.8));
    }

    let chunks = feed(&mut segmenter, &samples);
    assert!(chunks.is_empty(), "got {} early cuts", chunks.len());
    let tail = segmenter.flush().expect("remainder expected");
    assert_eq!(tail.samples.len(), samples.len());
}

#[test]
fn conditioning_preserves_reassembly_across_cuts() {
    let config = SessionConfig::default();
    let conditioning = ConditioningPipeline::new(config.dsp.clone());
    let mut segmenter = Segmenter::new(&config);

    let mut samples = speech(11.0);
    samples.extend(silence(2.0));
    samples.extend(speech(4.0));

    let mut chunks = feed(&mut segmenter, &samples);
    chunks.extend(segmenter.flush());

    let mut conditioned_total = 0usize;
    for chunk in &chunks {
        let conditioned = conditioning.process(chunk).expect("conditioning failed");
        assert_eq!(conditioned.samples.len(), chunk.samples.len());
        conditioned_total += conditioned.samples.len();
    }
    assert_eq!(conditioned_total, samples.len());
}

// ── Full session loop over a real queue ──────────────────────────────────

fn scaled_config() -> SessionConfig {
    SessionConfig {
        silence_window_secs: 0.3,
        min_chunk_secs: 0.5,
        max_buffer_secs: 4.0,
        ..SessionConfig::default()
    }
}

fn recv_event(rx: &mut broadcast::Receiver<ChunkEvent>, timeout: Duration) -> ChunkEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for chunk event");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("chunk channel closed unexpectedly"),
        }
    }
}

#[test]
fn session_produces_ordered_events_and_contextual_prompts() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (block_tx, block_rx) = create_block_queue();
    let (chunk_tx, mut chunk_rx) = broadcast::channel(64);

    let config = scaled_config();
    let stats = Arc::new(SessionStats::default());
    let ctx = SessionContext {
        conditioning: ConditioningPipeline::new(config.dsp.clone()),
        config,
        transcriber: TranscriberHandle::new(WordTranscriber {
            words: vec!["alpha", "bravo", "charlie"],
            calls: Arc::clone(&calls),
        }),
        blocks: block_rx,
        armed: Arc::new(AtomicBool::new(true)),
        chunk_tx,
        stats: Arc::clone(&stats),
    };

    let handle = thread::spawn(move || run(ctx));

    // Two silence-separated utterances plus a trailing one for the flush.
    let mut samples = speech(1.0);
    samples.extend(silence(0.5));
    samples.extend(speech(1.0));
    samples.extend(silence(0.5));
    samples.extend(speech(0.5));
    for block in samples.chunks(BLOCK) {
        block_tx.send(SampleBlock::new(block.to_vec())).unwrap();
    }
    drop(block_tx);

    let transcript = handle.join().expect("session thread panicked");
    assert_eq!(transcript, "alpha bravo charlie");

    let events: Vec<ChunkEvent> = (0..3)
        .map(|_| recv_event(&mut chunk_rx, Duration::from_secs(2)))
        .collect();
    assert_eq!(
        events.iter().map(|e| e.seq).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(events[0].reason, CutReason::Silence);
    assert_eq!(events[1].reason, CutReason::Silence);
    assert_eq!(events[2].reason, CutReason::EndOfRecording);
    assert_eq!(events[0].text, "alpha");
    assert_eq!(events[2].text, "charlie");

    // Each chunk decodes against the transcript accumulated before it.
    let calls = calls.lock();
    assert_eq!(calls[0], None);
    assert_eq!(calls[1].as_deref(), Some("alpha"));
    assert_eq!(calls[2].as_deref(), Some("alpha bravo"));

    let snap = stats.snapshot();
    assert_eq!(snap.silence_cuts, 2);
    assert_eq!(snap.flush_cuts, 1);
    assert_eq!(snap.chunks_emitted, 3);
    assert_eq!(snap.samples_in, samples.len());
}

#[test]
fn disarm_mid_speech_flushes_pending_audio() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (block_tx, block_rx) = create_block_queue();
    let (chunk_tx, mut chunk_rx) = broadcast::channel(64);

    let config = scaled_config();
    let armed = Arc::new(AtomicBool::new(true));
    let ctx = SessionContext {
        conditioning: ConditioningPipeline::new(config.dsp.clone()),
        config,
        transcriber: TranscriberHandle::new(WordTranscriber {
            words: vec!["tail"],
            calls: Arc::clone(&calls),
        }),
        blocks: block_rx,
        armed: Arc::clone(&armed),
        chunk_tx,
        stats: Arc::new(SessionStats::default()),
    };

    let handle = thread::spawn(move || run(ctx));

    let samples = speech(0.9);
    for block in samples.chunks(BLOCK) {
        block_tx.send(SampleBlock::new(block.to_vec())).unwrap();
    }
    thread::sleep(Duration::from_millis(60));
    armed.store(false, Ordering::SeqCst);

    let transcript = handle.join().expect("session thread panicked");
    assert_eq!(transcript, "tail");

    let event = recv_event(&mut chunk_rx, Duration::from_secs(2));
    assert_eq!(event.reason, CutReason::EndOfRecording);
    assert!((event.duration_secs - 0.9).abs() < 1e-6);
    drop(block_tx);
}
