//! Spectral-gating noise reduction keyed off a leading noise sample.
//!
//! The chunk's own first half-second is taken as the noise profile: mean and
//! standard deviation of the magnitude spectrum per frequency bin over the
//! profile frames. Bins that stay below `mean + 1.5·std` in the main pass
//! are scaled down proportionally to the configured reduction strength.
//! Reconstruction is a Hann-windowed overlap-add normalized by the
//! window-sum, floored at its steady-state value: the partially-overlapped
//! first and last samples come out as a short fade rather than being
//! divided by a near-zero sum, and the output length equals the input
//! length exactly.

use rustfft::{num_complex::Complex, FftPlanner};

/// STFT frame size.
const FFT_SIZE: usize = 512;
/// Hop between frames (75 % overlap).
const HOP: usize = FFT_SIZE / 4;
/// Standard deviations above the bin mean that still count as noise.
const NOISE_STD_FACTOR: f32 = 1.5;
/// Steady-state overlap-add sum of Hann² at 4x overlap.
const COLA_WSUM: f32 = 1.5;

/// Reduce stationary noise in `samples`.
///
/// `noise_clip_len` samples from the start of the input form the noise
/// profile. `prop_decrease` in [0, 1] is the fraction of estimated noise
/// energy to remove (0.85 → gated bins keep 15 % of their magnitude).
///
/// Inputs shorter than one FFT frame are returned unchanged — too short to
/// profile.
pub fn reduce_noise(samples: &[f32], noise_clip_len: usize, prop_decrease: f32) -> Vec<f32> {
    if samples.len() < FFT_SIZE {
        return samples.to_vec();
    }

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(FFT_SIZE);
    let inverse = planner.plan_fft_inverse(FFT_SIZE);

    let window: Vec<f32> = (0..FFT_SIZE)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (FFT_SIZE - 1) as f32).cos())
        })
        .collect();

    // Profile clip: leading noise_clip_len samples, but never shorter than
    // one frame (fall back to the whole chunk for very small clips).
    let clip_end = noise_clip_len.clamp(FFT_SIZE, samples.len());
    let clip = &samples[..clip_end];

    let mut scratch = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];

    // Per-bin running mean and mean-of-squares over the profile frames.
    let mut mean = vec![0.0f32; FFT_SIZE];
    let mut mean_sq = vec![0.0f32; FFT_SIZE];
    let mut frames = 0usize;
    let mut start = 0;
    while start + FFT_SIZE <= clip.len() {
        fill_frame(&mut scratch, &clip[start..start + FFT_SIZE], &window);
        forward.process(&mut scratch);
        for (bin, value) in scratch.iter().enumerate() {
            let mag = value.norm();
            mean[bin] += mag;
            mean_sq[bin] += mag * mag;
        }
        frames += 1;
        start += HOP;
    }
    if frames == 0 {
        return samples.to_vec();
    }
    let inv = 1.0 / frames as f32;
    let threshold: Vec<f32> = mean
        .iter()
        .zip(&mean_sq)
        .map(|(&m, &sq)| {
            let m = m * inv;
            let var = (sq * inv - m * m).max(0.0);
            m + NOISE_STD_FACTOR * var.sqrt()
        })
        .collect();

    // Main pass: gate, inverse transform, overlap-add.
    let gate_gain = (1.0 - prop_decrease).clamp(0.0, 1.0);
    let mut out = vec![0.0f32; samples.len()];
    let mut wsum = vec![0.0f32; samples.len()];
    let mut frame = vec![0.0f32; FFT_SIZE];

    let mut start = 0;
    while start < samples.len() {
        let available = (samples.len() - start).min(FFT_SIZE);
        frame[..available].copy_from_slice(&samples[start..start + available]);
        frame[available..].fill(0.0);

        fill_frame(&mut scratch, &frame, &window);
        forward.process(&mut scratch);
        for (bin, value) in scratch.iter_mut().enumerate() {
            if value.norm() < threshold[bin] {
                *value *= gate_gain;
            }
        }
        inverse.process(&mut scratch);

        // rustfft leaves the inverse un-normalized (scaled by FFT_SIZE).
        let norm = 1.0 / FFT_SIZE as f32;
        for i in 0..available {
            out[start + i] += scratch[i].re * norm * window[i];
            wsum[start + i] += window[i] * window[i];
        }

        start += HOP;
    }

    // At the edges only one or two frames overlap and the window sum drops
    // toward zero; dividing by the raw sum there blows the reconstruction
    // error past full scale. Flooring the divisor at the steady-state sum
    // turns those samples into a short fade instead.
    for (sample, &w) in out.iter_mut().zip(&wsum) {
        *sample /= w.max(COLA_WSUM);
    }

    out
}

fn fill_frame(scratch: &mut [Complex<f32>], frame: &[f32], window: &[f32]) {
    for (slot, (&sample, &w)) in scratch.iter_mut().zip(frame.iter().zip(window)) {
        *slot = Complex::new(sample * w, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::rms;

    const SR: usize = 16_000;

    /// Deterministic pseudo-random noise in [-amplitude, amplitude].
    fn noise(amplitude: f32, len: usize, seed: u64) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let unit = ((state >> 33) as f32 / (1u64 << 31) as f32) - 1.0;
                unit * amplitude
            })
            .collect()
    }

    fn tone(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    #[test]
    fn length_always_preserved() {
        for len in [512usize, 1000, 8_000, 16_001] {
            let input = noise(0.05, len, 7);
            let out = reduce_noise(&input, 8_000, 0.85);
            assert_eq!(out.len(), len, "len={len}");
        }
    }

    #[test]
    fn short_input_passes_through() {
        let input = noise(0.05, 300, 3);
        assert_eq!(reduce_noise(&input, 8_000, 0.85), input);
    }

    #[test]
    fn noise_floor_is_attenuated_tone_survives() {
        // 0.5 s noise lead-in (the profile), then tone + noise, then noise.
        let n = noise(0.02, 3 * SR / 2, 42);
        let mut input = n.clone();
        let t = tone(440.0, 0.5, SR / 2);
        for (sample, &add) in input[SR / 2..SR].iter_mut().zip(&t) {
            *sample += add;
        }

        let out = reduce_noise(&input, SR / 2, 0.85);
        assert_eq!(out.len(), input.len());

        // Trailing pure-noise region: gated bins keep 15 % of their
        // magnitude and the occasional above-threshold bin passes whole, so
        // expect a clear but not total drop.
        let in_tail = rms(&input[SR + 400..3 * SR / 2 - 400]);
        let out_tail = rms(&out[SR + 400..3 * SR / 2 - 400]);
        assert!(
            out_tail < in_tail * 0.7,
            "noise tail rms {out_tail} vs input {in_tail}"
        );

        // Tone region: the dominant bin is far above the noise profile and
        // must pass mostly intact.
        let in_tone = rms(&input[SR / 2 + 400..SR - 400]);
        let out_tone = rms(&out[SR / 2 + 400..SR - 400]);
        assert!(
            out_tone > in_tone * 0.6,
            "tone rms {out_tone} vs input {in_tone}"
        );
    }

    #[test]
    fn chunk_edges_are_not_amplified() {
        // A near-full-scale tone must not come back past full scale
        // anywhere, least of all in the partially-overlapped first hop.
        let input = tone(440.0, 0.9, SR);
        let out = reduce_noise(&input, SR / 2, 0.85);
        let peak = out.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak <= 1.0, "peak {peak}");
    }

    #[test]
    fn zero_strength_changes_little() {
        let input = noise(0.05, 4_000, 11);
        let out = reduce_noise(&input, 2_000, 0.0);
        // With prop_decrease = 0 the gate is a no-op; away from the Hann
        // edge taper only round-off remains.
        let diff: f32 = input[FFT_SIZE..4_000 - FFT_SIZE]
            .iter()
            .zip(&out[FFT_SIZE..4_000 - FFT_SIZE])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max);
        assert!(diff < 1e-3, "max diff {diff}");
    }
}
