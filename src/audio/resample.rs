//! Device-rate to pipeline-rate conversion using a rubato `FastFixedIn`
//! resampler, with re-blocking into fixed pipeline blocks.
//!
//! ## Design
//!
//! `cpal` captures audio at the device's native rate (commonly 48 kHz) and in
//! callback-sized bursts that rarely match the pipeline's 100 ms block
//! granularity. `BlockResampler` bridges both gaps: it accumulates input
//! until rubato has a full chunk, converts, and stages the converted samples
//! until whole `SampleBlock`s can be emitted.
//!
//! When device rate == pipeline rate, no rubato session is created at all
//! and input passes straight to the staging buffer.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::buffering::chunk::SampleBlock;
use crate::error::{Result, SottoError};

/// Input frame count per rubato call.
const RESAMPLE_CHUNK: usize = 960;

/// Converts f32 mono audio to the pipeline rate and cuts it into blocks.
pub struct BlockResampler {
    /// `None` when device rate == pipeline rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial rubato input chunks between calls.
    input_buf: Vec<f32>,
    /// Pre-allocated rubato output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
    /// Converted samples awaiting a full block.
    stage: Vec<f32>,
    /// Samples per emitted `SampleBlock`.
    block_samples: usize,
}

impl BlockResampler {
    /// # Errors
    /// Returns `SottoError::AudioDevice` if rubato fails to initialise.
    pub fn new(device_rate: u32, pipeline_rate: u32, block_samples: usize) -> Result<Self> {
        let resampler = if device_rate == pipeline_rate {
            None
        } else {
            let ratio = pipeline_rate as f64 / device_rate as f64;
            let resampler = FastFixedIn::<f32>::new(
                ratio,
                1.0, // fixed ratio — no dynamic adjustment
                PolynomialDegree::Cubic,
                RESAMPLE_CHUNK,
                1, // mono
            )
            .map_err(|e| SottoError::AudioDevice(format!("resampler init: {e}")))?;
            tracing::info!(device_rate, pipeline_rate, "resampling enabled");
            Some(resampler)
        };

        let output_buf = match &resampler {
            Some(r) => vec![vec![0f32; r.output_frames_max()]; 1],
            None => Vec::new(),
        };

        Ok(Self {
            resampler,
            input_buf: Vec::new(),
            output_buf,
            stage: Vec::new(),
            block_samples,
        })
    }

    /// Feed mono samples at the device rate; returns every complete block
    /// this call completes (possibly none).
    pub fn push(&mut self, samples: &[f32]) -> Vec<SampleBlock> {
        match self.resampler {
            None => self.stage.extend_from_slice(samples),
            Some(ref mut resampler) => {
                self.input_buf.extend_from_slice(samples);
                while self.input_buf.len() >= RESAMPLE_CHUNK {
                    let input_slice = &self.input_buf[..RESAMPLE_CHUNK];
                    match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None)
                    {
                        Ok((_consumed, produced)) => {
                            self.stage.extend_from_slice(&self.output_buf[0][..produced]);
                        }
                        Err(e) => {
                            error!("resampler process error: {e}");
                        }
                    }
                    self.input_buf.drain(..RESAMPLE_CHUNK);
                }
            }
        }

        let mut blocks = Vec::new();
        while self.stage.len() >= self.block_samples {
            let block: Vec<f32> = self.stage.drain(..self.block_samples).collect();
            blocks.push(SampleBlock::new(block));
        }
        blocks
    }

    /// Returns `true` when device rate == pipeline rate.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
