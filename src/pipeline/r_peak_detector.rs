//! Stage 2: Pan–Tompkins R-peak detection under physiological spacing
//! constraints. Spec.md §4.2. Fails soft — an unruly signal yields an
//! empty peak set, never an error.

use crate::pipeline::biquad::{clamp_cutoff, ButterworthCascade, FilterKind};
use crate::pipeline::stats::{diff_usize, mean, std_dev};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RPeakSet {
    pub indices: Vec<usize>,
}

impl RPeakSet {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DetectionReport {
    pub count: usize,
    pub mean_hr_bpm: f64,
    pub detection_envelope_len: usize,
}

pub struct RPeakDetector {
    sample_rate: f64,
}

impl RPeakDetector {
    pub fn new(sample_rate: f64) -> Self {
        Self { sample_rate }
    }

    pub fn detect(&self, preprocessed: &[f64]) -> (RPeakSet, DetectionReport) {
        let fs = self.sample_rate;
        if preprocessed.len() < 8 {
            return (RPeakSet::default(), DetectionReport { count: 0, mean_hr_bpm: 0.0, detection_envelope_len: 0 });
        }

        // 1. Band-pass 5-15 Hz, 2nd-order Butterworth, zero-phase (HP then LP).
        let nyquist = fs / 2.0;
        let hp_cutoff = clamp_cutoff(5.0, nyquist);
        let hp = ButterworthCascade::design(FilterKind::HighPass, 2, hp_cutoff, fs);
        let band_hp = hp.filtfilt(preprocessed);
        let lp_cutoff = clamp_cutoff(15.0, nyquist);
        let lp = ButterworthCascade::design(FilterKind::LowPass, 2, lp_cutoff, fs);
        let bandpassed = lp.filtfilt(&band_hp);

        // 2. Derivative filter, kernel [1, 2, 0, -2, -1] * (fs/8), 'same' convolution.
        let derivative = derivative_filter(&bandpassed, fs);

        // 3. Square pointwise.
        let squared: Vec<f64> = derivative.iter().map(|v| v * v).collect();

        // 4. Moving-average integrator, window = 0.15*fs samples.
        let window = ((0.15 * fs).round() as usize).max(1);
        let envelope = moving_average(&squared, window);

        // 5. Adaptive thresholding.
        let min_distance = (0.2 * fs).round() as usize;
        let maxfilter_window = ((0.2 * fs).round() as usize).max(1);
        let env_mean = mean(&envelope);
        let env_std = std_dev(&envelope);
        let mut candidates = local_maxima_above(&envelope, maxfilter_window, env_mean + 0.5 * env_std);
        if candidates.is_empty() {
            candidates = local_maxima_above(&envelope, maxfilter_window, env_mean);
        }

        // 6. Refractory enforcement.
        let kept = enforce_refractory(&candidates, min_distance.max(1));

        // 7. Refinement: relocate to local maximum in the original signal within +-0.05*fs.
        let refine_radius = ((0.05 * fs).round() as usize).max(1);
        let mut refined: Vec<usize> = kept
            .iter()
            .map(|&idx| refine_peak(preprocessed, idx, refine_radius))
            .collect();
        refined.dedup();
        refined.sort_unstable();

        let mean_hr_bpm = if refined.len() >= 2 {
            let rr_samples = diff_usize(&refined);
            let mean_rr_sec = mean(&rr_samples) / fs;
            if mean_rr_sec > 0.0 {
                60.0 / mean_rr_sec
            } else {
                0.0
            }
        } else {
            0.0
        };

        let report = DetectionReport {
            count: refined.len(),
            mean_hr_bpm,
            detection_envelope_len: envelope.len(),
        };
        (RPeakSet { indices: refined }, report)
    }
}

fn derivative_filter(x: &[f64], fs: f64) -> Vec<f64> {
    let kernel = [1.0, 2.0, 0.0, -2.0, -1.0].map(|k| k * (fs / 8.0));
    convolve_same(x, &kernel)
}

/// 'same'-mode convolution: output has the same length as `x`.
fn convolve_same(x: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = x.len();
    let k = kernel.len();
    let half = k / 2;
    let mut out = vec![0.0; n];
    for i in 0..n {
        let mut acc = 0.0;
        for (j, &kv) in kernel.iter().enumerate() {
            let offset = j as isize - half as isize;
            let src = i as isize + offset;
            if src >= 0 && (src as usize) < n {
                acc += x[src as usize] * kv;
            }
        }
        out[i] = acc;
    }
    out
}

fn moving_average(x: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || x.is_empty() {
        return x.to_vec();
    }
    let n = x.len();
    let mut out = vec![0.0; n];
    let mut sum = 0.0;
    let mut queue: std::collections::VecDeque<f64> = std::collections::VecDeque::with_capacity(window);
    for i in 0..n {
        queue.push_back(x[i]);
        sum += x[i];
        if queue.len() > window {
            sum -= queue.pop_front().unwrap();
        }
        out[i] = sum / queue.len() as f64;
    }
    out
}

/// Finds local maxima of `x` (each the max within a `window`-wide
/// neighborhood) that exceed `threshold`.
fn local_maxima_above(x: &[f64], window: usize, threshold: f64) -> Vec<usize> {
    let n = x.len();
    let half = (window / 2).max(1);
    let mut out = Vec::new();
    for i in 0..n {
        if x[i] <= threshold {
            continue;
        }
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(n - 1);
        let is_max = (lo..=hi).all(|j| x[j] <= x[i]);
        if is_max {
            out.push(i);
        }
    }
    out
}

fn enforce_refractory(candidates: &[usize], min_distance: usize) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::new();
    for &c in candidates {
        match kept.last() {
            Some(&last) if c.saturating_sub(last) < min_distance => continue,
            _ => kept.push(c),
        }
    }
    kept
}

fn refine_peak(signal: &[f64], idx: usize, radius: usize) -> usize {
    let n = signal.len();
    let lo = idx.saturating_sub(radius);
    let hi = (idx + radius).min(n - 1);
    let mut best = idx;
    let mut best_val = signal[idx];
    for j in lo..=hi {
        if signal[j] > best_val {
            best_val = signal[j];
            best = j;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::preprocessor::Preprocessor;
    use std::f64::consts::PI;

    fn synthetic_ecg(seconds: f64, fs: f64, bpm: f64, amplitude: f64) -> Vec<i32> {
        let n = (seconds * fs) as usize;
        let beat_period = 60.0 / bpm;
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                let phase = (t % beat_period) / beat_period;
                let qrs = (-((phase - 0.5).powi(2)) / (2.0 * 0.01 * 0.01)).exp();
                ((qrs * amplitude) * 1000.0) as i32
            })
            .collect()
    }

    #[test]
    fn peaks_strictly_increasing_and_spaced() {
        let raw = synthetic_ecg(10.0, 500.0, 70.0, 1.0);
        let pp = Preprocessor::new(500.0);
        let (filtered, _) = pp.process(&raw).unwrap();
        let detector = RPeakDetector::new(500.0);
        let (peaks, report) = detector.detect(&filtered);
        assert!(peaks.indices.windows(2).all(|w| w[1] > w[0]));
        assert!(peaks.indices.windows(2).all(|w| (w[1] - w[0]) as f64 >= 0.2 * 500.0));
        assert!(report.count >= 10 && report.count <= 14, "count={}", report.count);
        assert!(report.mean_hr_bpm >= 65.0 && report.mean_hr_bpm <= 75.0, "hr={}", report.mean_hr_bpm);
    }

    #[test]
    fn flat_signal_yields_no_peaks() {
        let flat = vec![0.0; 1500];
        let detector = RPeakDetector::new(500.0);
        let (peaks, report) = detector.detect(&flat);
        assert_eq!(report.mean_hr_bpm, 0.0);
        assert!(peaks.indices.len() < 3);
    }

    #[test]
    fn sixty_hz_sinusoid_yields_few_peaks() {
        let fs = 500.0;
        let n = 1500;
        let raw: Vec<i32> = (0..n)
            .map(|i| ((2.0 * PI * 60.0 * i as f64 / fs).sin() * 1000.0) as i32)
            .collect();
        let pp = Preprocessor::new(fs);
        let (filtered, _) = pp.process(&raw).unwrap();
        let detector = RPeakDetector::new(fs);
        let (peaks, _) = detector.detect(&filtered);
        assert!(peaks.indices.len() < 3, "expected fewer than 3 peaks, got {}", peaks.indices.len());
    }
}
