//! Silence-boundary detection over a rolling RMS envelope.
//!
//! ## Algorithm
//!
//! 1. Partition the buffer into fixed 100 ms windows and compute RMS per
//!    window. A window is silent when its RMS falls below the threshold.
//! 2. A cut requires `ceil(silence_window_secs / 0.1)` consecutive silent
//!    windows.
//! 3. Scan *backward* from the end of the buffer for the most recent
//!    qualifying run. Scanning backward favours cutting as late as possible,
//!    which maximizes natural utterance completeness.
//! 4. The cut point is the sample index at the start of the run, and must
//!    lie at or after `min_chunk_secs` of audio so every dispatched chunk
//!    has a usable minimum size.

/// RMS analysis window width in seconds.
const RMS_WINDOW_SECS: f32 = 0.1;

/// Finds silence-based cut points in a pending sample buffer.
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    /// RMS level below which a window counts as silent.
    rms_threshold: f32,
    /// Consecutive silent windows required for a cut.
    required_windows: usize,
    /// Samples per analysis window (100 ms at the configured rate).
    window_samples: usize,
    /// A cut may not land before this many samples.
    min_chunk_samples: usize,
}

impl SilenceDetector {
    pub fn new(
        rms_threshold: f32,
        silence_window_secs: f32,
        min_chunk_secs: f32,
        sample_rate: u32,
    ) -> Self {
        let window_samples = (sample_rate as f32 * RMS_WINDOW_SECS) as usize;
        let required_windows = (silence_window_secs / RMS_WINDOW_SECS).ceil().max(1.0) as usize;
        let min_chunk_samples = (min_chunk_secs * sample_rate as f32) as usize;
        Self {
            rms_threshold,
            required_windows,
            window_samples,
            min_chunk_samples,
        }
    }

    /// Find the most recent qualifying silence cut in `buffer`.
    ///
    /// Returns the sample index at the start of the silent run, or `None`
    /// when no run satisfies both the silence-duration and minimum-chunk
    /// constraints. Only complete windows are considered; a trailing partial
    /// window never contributes to a run.
    pub fn find_cut(&self, buffer: &[f32]) -> Option<usize> {
        let w = self.window_samples;
        if buffer.len() < w {
            return None;
        }

        let num_windows = buffer.len() / w;
        if num_windows < self.required_windows {
            return None;
        }

        let silent: Vec<bool> = (0..num_windows)
            .map(|i| rms(&buffer[i * w..(i + 1) * w]) < self.rms_threshold)
            .collect();

        for start in (0..=num_windows - self.required_windows).rev() {
            if silent[start..start + self.required_windows].iter().all(|&s| s) {
                let cut = start * w;
                // Runs found earlier in the scan start earlier still, so the
                // min-chunk constraint cannot be met by continuing.
                return (cut >= self.min_chunk_samples).then_some(cut);
            }
        }

        None
    }
}

/// Root-mean-square of a sample slice. An all-zero window yields 0, which is
/// below any positive threshold.
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
