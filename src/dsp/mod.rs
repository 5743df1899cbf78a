//! Chunk conditioning: normalize → de-ess → gain → spectral denoise.
//!
//! Every stage preserves the sample count exactly. A stage that changed the
//! length would desynchronize transcript timing from captured audio, so the
//! pipeline treats that as an internal error rather than passing it along.

pub mod deesser;
pub mod denoise;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffering::chunk::{Chunk, ConditionedChunk};
use crate::error::{Result, SottoError};
use deesser::DeEsserParams;

/// Convert a dB value to a linear gain factor.
pub(crate) fn db_to_gain(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Convert a linear RMS level to dBFS. Silence is floored rather than −∞.
pub(crate) fn dbfs(level: f32) -> f32 {
    20.0 * level.max(1e-10).log10()
}

/// Root-mean-square of a sample slice.
pub(crate) fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Tuning for the conditioning stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DspConfig {
    /// Peak headroom left by normalization (dB below full scale).
    pub normalize_headroom_db: f32,
    /// De-esser engagement threshold (dBFS of the sibilant band).
    pub deesser_threshold_db: f32,
    /// Lower edge of the sibilant band (Hz).
    pub deesser_freq_start_hz: f32,
    /// Upper edge of the sibilant band (Hz).
    pub deesser_freq_end_hz: f32,
    /// De-esser attenuation depth (dB).
    pub deesser_attenuation_db: f32,
    /// De-esser attack fade (ms).
    pub deesser_attack_ms: f32,
    /// De-esser release fade (ms).
    pub deesser_release_ms: f32,
    /// Final make-up gain before denoising (dB).
    pub gain_db: f32,
    /// Length of the leading noise-profile clip (seconds).
    pub noise_clip_secs: f32,
    /// Spectral gate strength in [0, 1].
    pub noise_reduction: f32,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            normalize_headroom_db: 0.1,
            deesser_threshold_db: -43.0,
            deesser_freq_start_hz: 6_000.0,
            deesser_freq_end_hz: 10_000.0,
            deesser_attenuation_db: 13.0,
            deesser_attack_ms: 10.0,
            deesser_release_ms: 30.0,
            gain_db: 6.0,
            noise_clip_secs: 0.5,
            noise_reduction: 0.85,
        }
    }
}

/// Runs the full conditioning chain over finalized chunks.
#[derive(Debug, Clone)]
pub struct ConditioningPipeline {
    config: DspConfig,
}

impl ConditioningPipeline {
    pub fn new(config: DspConfig) -> Self {
        Self { config }
    }

    /// Condition one chunk. The caller is expected to fall back to the raw
    /// samples when this returns `Err` — a conditioning failure must never
    /// cost the speaker their words.
    pub fn process(&self, chunk: &Chunk) -> Result<ConditionedChunk> {
        if chunk.samples.iter().any(|s| !s.is_finite()) {
            return Err(SottoError::Conditioning(
                "non-finite sample in input chunk".into(),
            ));
        }

        let cfg = &self.config;
        let mut samples = normalize(&chunk.samples, cfg.normalize_headroom_db);

        let params = DeEsserParams {
            threshold_db: cfg.deesser_threshold_db,
            freq_start_hz: cfg.deesser_freq_start_hz,
            freq_end_hz: cfg.deesser_freq_end_hz,
            attenuation_db: cfg.deesser_attenuation_db,
            attack_ms: cfg.deesser_attack_ms,
            release_ms: cfg.deesser_release_ms,
        };
        samples = deesser::de_ess(&samples, chunk.sample_rate, &params);

        let gain = db_to_gain(cfg.gain_db);
        for sample in &mut samples {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }

        let clip_len = (cfg.noise_clip_secs * chunk.sample_rate as f32) as usize;
        if !samples.is_empty() {
            let lead = &samples[..clip_len.min(samples.len())];
            let lead_db = dbfs(rms(lead));
            if lead_db > -20.0 {
                debug!(lead_db, "noise profile clip is not quiet; gating may bite into speech");
            }
        }
        samples = denoise::reduce_noise(&samples, clip_len, cfg.noise_reduction);

        if samples.len() != chunk.samples.len() {
            return Err(SottoError::Conditioning(format!(
                "length changed during conditioning: {} -> {}",
                chunk.samples.len(),
                samples.len()
            )));
        }

        Ok(ConditionedChunk {
            samples,
            sample_rate: chunk.sample_rate,
        })
    }
}

/// Scale so the absolute peak sits `headroom_db` below full scale. Silent
/// input is returned unchanged.
fn normalize(samples: &[f32], headroom_db: f32) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak <= 0.0 {
        return samples.to_vec();
    }
    let target = db_to_gain(-headroom_db.abs());
    let scale = target / peak;
    samples.iter().map(|s| s * scale).collect()
}
