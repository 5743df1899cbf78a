//! Offline harness: run a WAV file through the full streaming chain
//! (resample → segment → condition → transcribe) exactly as a live session
//! would, 100 ms at a time, and print the resulting transcript.
//!
//! With no real backend configured the stub transcriber echoes chunk
//! metadata, which is still enough to inspect segmentation decisions and
//! dump conditioned audio for listening tests.

fn main() {
    if let Err(e) = run() {
        eprintln!("transcribe-wav failed: {e}");
        std::process::exit(1);
    }
}

/// Samples of synthetic silence the resampler flush appended beyond the
/// file's own audio, given how many resampled samples were fed onward.
fn flush_padding(input_len: usize, wav_rate: u32, pipeline_rate: u32, fed: usize) -> usize {
    let expected =
        (input_len as f64 * f64::from(pipeline_rate) / f64::from(wav_rate)).round() as usize;
    fed.saturating_sub(expected)
}

fn run() -> Result<(), String> {
    use std::path::{Path, PathBuf};

    use sotto::buffering::chunk::SampleBlock;
    use sotto::dsp::ConditioningPipeline;
    use sotto::engine::session::Segmenter;
    use sotto::engine::SessionConfig;
    use sotto::stt::{stub::StubTranscriber, DecodeOptions, Transcriber};
    use sotto::transcript::TranscriptAccumulator;
    use sotto::{audio::resample::BlockResampler, ConditionedChunk};

    #[derive(Debug)]
    struct Args {
        input: PathBuf,
        dump_chunks: Option<PathBuf>,
        min_chunk_secs: Option<f32>,
        max_buffer_secs: Option<f32>,
    }

    fn parse_args() -> Result<Args, String> {
        let mut input: Option<PathBuf> = None;
        let mut dump_chunks: Option<PathBuf> = None;
        let mut min_chunk_secs: Option<f32> = None;
        let mut max_buffer_secs: Option<f32> = None;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--dump-chunks" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --dump-chunks".into());
                    };
                    dump_chunks = Some(PathBuf::from(v));
                }
                "--min-chunk-secs" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --min-chunk-secs".into());
                    };
                    min_chunk_secs =
                        Some(v.parse().map_err(|_| "invalid --min-chunk-secs".to_string())?);
                }
                "--max-buffer-secs" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --max-buffer-secs".into());
                    };
                    max_buffer_secs =
                        Some(v.parse().map_err(|_| "invalid --max-buffer-secs".to_string())?);
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: transcribe-wav <input.wav> [--dump-chunks <dir>] \\
  [--min-chunk-secs <s>] [--max-buffer-secs <s>]"
                    );
                    std::process::exit(0);
                }
                other if input.is_none() && !other.starts_with('-') => {
                    input = Some(PathBuf::from(other));
                }
                other => return Err(format!("unknown argument: {other}")),
            }
        }

        let input = input.ok_or_else(|| "missing input WAV path".to_string())?;
        Ok(Args {
            input,
            dump_chunks,
            min_chunk_secs,
            max_buffer_secs,
        })
    }

    fn read_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32), String> {
        let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map_err(|e| e.to_string()))
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample <= 16 {
                    reader
                        .samples::<i16>()
                        .map(|s| {
                            s.map(|v| (v as f32) / (i16::MAX as f32))
                                .map_err(|e| e.to_string())
                        })
                        .collect::<Result<Vec<_>, _>>()?
                } else {
                    let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
                    reader
                        .samples::<i32>()
                        .map(|s| s.map(|v| (v as f32) / max).map_err(|e| e.to_string()))
                        .collect::<Result<Vec<_>, _>>()?
                }
            }
        };

        if channels == 1 {
            return Ok((interleaved, spec.sample_rate));
        }

        let mut mono = Vec::with_capacity(interleaved.len() / channels);
        for frame in interleaved.chunks(channels) {
            let sum = frame.iter().copied().sum::<f32>();
            mono.push(sum / channels as f32);
        }
        Ok((mono, spec.sample_rate))
    }

    fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), String> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).map_err(|e| e.to_string())?;
        for &sample in samples {
            writer.write_sample(sample).map_err(|e| e.to_string())?;
        }
        writer.finalize().map_err(|e| e.to_string())
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let (samples, wav_rate) = read_wav_mono_f32(&args.input)?;
    println!(
        "{}: {} samples @ {} Hz ({:.2} s)",
        args.input.display(),
        samples.len(),
        wav_rate,
        samples.len() as f64 / wav_rate as f64
    );

    let mut config = SessionConfig::default();
    if let Some(v) = args.min_chunk_secs {
        config.min_chunk_secs = v;
    }
    if let Some(v) = args.max_buffer_secs {
        config.max_buffer_secs = v;
    }
    config.validate().map_err(|e| e.to_string())?;

    if let Some(dir) = &args.dump_chunks {
        std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    }

    let block_samples = (config.pipeline_sample_rate / 10) as usize;
    let mut resampler = BlockResampler::new(wav_rate, config.pipeline_sample_rate, block_samples)
        .map_err(|e| e.to_string())?;
    let mut segmenter = Segmenter::new(&config);
    let conditioning = ConditioningPipeline::new(config.dsp.clone());
    let mut transcriber = StubTranscriber::new();
    transcriber.warm_up().map_err(|e| e.to_string())?;
    let mut accumulator = TranscriptAccumulator::new(config.max_prompt_chars);
    let options = DecodeOptions::default();

    let mut seq = 0u64;
    let mut handle_chunk = |chunk: sotto::Chunk,
                            accumulator: &mut TranscriptAccumulator,
                            transcriber: &mut StubTranscriber|
     -> Result<(), String> {
        let conditioned = match conditioning.process(&chunk) {
            Ok(conditioned) => conditioned,
            Err(e) => {
                eprintln!("chunk {seq}: conditioning failed ({e}), using raw audio");
                ConditionedChunk {
                    samples: chunk.samples.clone(),
                    sample_rate: chunk.sample_rate,
                }
            }
        };
        if let Some(dir) = &args.dump_chunks {
            let path = dir.join(format!("chunk-{seq:03}.wav"));
            write_wav(&path, &conditioned.samples, conditioned.sample_rate)?;
        }
        let context = accumulator.context_for_next();
        let recognition = transcriber
            .transcribe(&conditioned, context.as_deref(), &options)
            .map_err(|e| e.to_string())?;
        println!(
            "chunk {seq}: {:?} {:.2} s -> {:?}",
            chunk.reason,
            chunk.duration_secs(),
            recognition.text
        );
        accumulator.append(&recognition.text);
        seq += 1;
        Ok(())
    };

    let mut fed = 0usize;
    for window in samples.chunks((wav_rate / 10).max(1) as usize) {
        for block in resampler.push(window) {
            fed += block.len();
            for chunk in segmenter.push(&block) {
                handle_chunk(chunk, &mut accumulator, &mut transcriber)?;
            }
        }
    }
    // The resampler may retain a sub-block tail; push silence to force it
    // out, then trim the padding off the flushed remainder so the final
    // chunk length matches the file tail.
    for block in resampler.push(&vec![0.0f32; block_samples]) {
        fed += block.len();
        for chunk in segmenter.push(&block) {
            handle_chunk(chunk, &mut accumulator, &mut transcriber)?;
        }
    }
    if let Some(mut chunk) = segmenter.flush() {
        let padding = flush_padding(samples.len(), wav_rate, config.pipeline_sample_rate, fed);
        let keep = chunk.samples.len().saturating_sub(padding);
        chunk.samples.truncate(keep);
        if !chunk.samples.is_empty() {
            handle_chunk(chunk, &mut accumulator, &mut transcriber)?;
        }
    }

    println!("---");
    println!("{}", accumulator.finalize());
    Ok(())
}
