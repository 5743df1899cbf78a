//! Dynamic sibilance suppressor with fade-smoothed attack/release.
//!
//! A first-order RC high-pass/low-pass cascade isolates the sibilant band.
//! The signal is then walked in 10 ms slices: when band energy (dBFS) rises
//! above the threshold the attenuation engages, when it falls back below it
//! disengages. The boolean state plus the attack/release crossfade is what
//! prevents audible clicks — a naive per-slice gain switch produces
//! discontinuities at every boundary.

use super::{db_to_gain, dbfs, rms};

/// Gain-decision slice width. Matches the 10 ms granularity the band energy
/// is measured at.
const SLICE_MS: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct DeEsserParams {
    /// Band energy (dBFS) above which attenuation engages.
    pub threshold_db: f32,
    /// Lower edge of the sibilant band (Hz).
    pub freq_start_hz: f32,
    /// Upper edge of the sibilant band (Hz).
    pub freq_end_hz: f32,
    /// Full attenuation depth applied while engaged (dB, positive).
    pub attenuation_db: f32,
    /// Fade-in time to full attenuation (ms).
    pub attack_ms: f32,
    /// Fade-out time back to dry signal (ms).
    pub release_ms: f32,
}

/// Apply the de-esser. Output length always equals input length.
pub fn de_ess(samples: &[f32], sample_rate: u32, params: &DeEsserParams) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let band = band_pass(samples, sample_rate, params.freq_start_hz, params.freq_end_hz);

    let slice_len = ((sample_rate as f32 * SLICE_MS / 1000.0) as usize).max(1);
    let attenuated_gain = db_to_gain(-params.attenuation_db.abs());
    let attack_step = 1.0 / (sample_rate as f32 * params.attack_ms / 1000.0).max(1.0);
    let release_step = 1.0 / (sample_rate as f32 * params.release_ms / 1000.0).max(1.0);

    let mut out = Vec::with_capacity(samples.len());
    let mut is_attenuating = false;
    // Blend position between dry (0.0) and fully attenuated (1.0). Ramped
    // per sample so attack/release fades carry across slice boundaries.
    let mut blend = 0.0f32;

    for (dry_slice, band_slice) in samples.chunks(slice_len).zip(band.chunks(slice_len)) {
        let band_level_db = dbfs(rms(band_slice));
        let above = band_level_db > params.threshold_db;

        if above && !is_attenuating {
            is_attenuating = true;
        } else if !above && is_attenuating {
            is_attenuating = false;
        }

        for &sample in dry_slice {
            blend = if is_attenuating {
                (blend + attack_step).min(1.0)
            } else {
                (blend - release_step).max(0.0)
            };
            out.push(sample * (1.0 - blend * (1.0 - attenuated_gain)));
        }
    }

    out
}

/// Isolate [lo, hi] with first-order RC filters (high-pass then low-pass).
fn band_pass(samples: &[f32], sample_rate: u32, lo_hz: f32, hi_hz: f32) -> Vec<f32> {
    low_pass(&high_pass(samples, sample_rate, lo_hz), sample_rate, hi_hz)
}

fn high_pass(samples: &[f32], sample_rate: u32, cutoff_hz: f32) -> Vec<f32> {
    let dt = 1.0 / sample_rate as f32;
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let alpha = rc / (rc + dt);

    let mut out = Vec::with_capacity(samples.len());
    let mut prev_in = 0.0f32;
    let mut prev_out = 0.0f32;
    for &x in samples {
        let y = alpha * (prev_out + x - prev_in);
        out.push(y);
        prev_in = x;
        prev_out = y;
    }
    out
}

fn low_pass(samples: &[f32], sample_rate: u32, cutoff_hz: f32) -> Vec<f32> {
    let dt = 1.0 / sample_rate as f32;
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let alpha = dt / (rc + dt);

    let mut out = Vec::with_capacity(samples.len());
    let mut prev = 0.0f32;
    for &x in samples {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}
