//! Stage 1: band-limit the raw waveform and score its quality.
//!
//! Spec.md §4.1. Three zero-phase IIR stages in a fixed order (baseline
//! removal, high-frequency denoise, powerline notch), followed by a quality
//! score that is purely informational — rejection is the caller's decision.

use crate::error::PipelineError;
use crate::pipeline::biquad::{clamp_cutoff, filtfilt_single, notch_filter, ButterworthCascade, FilterKind};
use crate::pipeline::stats::{mean, std_dev, variance};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    pub snr_db: f64,
    pub saturated: bool,
    pub flat: bool,
    pub score: u8,
    pub acceptable: bool,
}

pub struct Preprocessor {
    sample_rate: f64,
}

impl Preprocessor {
    pub fn new(sample_rate: f64) -> Self {
        Self { sample_rate }
    }

    /// Filters `raw` and scores its quality. Same length in, same length
    /// out; the only failure mode is an empty input.
    pub fn process(&self, raw: &[i32]) -> Result<(Vec<f64>, QualityReport), PipelineError> {
        if raw.is_empty() {
            return Err(PipelineError::EmptySignal);
        }
        let x: Vec<f64> = raw.iter().map(|&v| v as f64).collect();

        let nyquist = self.sample_rate / 2.0;

        // Stage 1: baseline removal, 2nd-order Butterworth high-pass @ 0.5 Hz.
        let hpf_cutoff = clamp_cutoff(0.5, nyquist);
        let hpf = ButterworthCascade::design(FilterKind::HighPass, 2, hpf_cutoff, self.sample_rate);
        let stage1 = hpf.filtfilt(&x);

        // Stage 2: high-frequency denoise, 4th-order Butterworth low-pass @ 45 Hz.
        let lpf_cutoff_hz = 45.0;
        let stage2 = if lpf_cutoff_hz < nyquist {
            let lpf_cutoff = clamp_cutoff(lpf_cutoff_hz, nyquist);
            let lpf = ButterworthCascade::design(FilterKind::LowPass, 4, lpf_cutoff, self.sample_rate);
            lpf.filtfilt(&stage1)
        } else {
            stage1
        };

        // Stage 3: powerline notch @ 60 Hz, Q = 30; skipped when 60Hz >= Nyquist.
        let filtered = if 60.0 < nyquist {
            let notch = notch_filter(60.0, 30.0, self.sample_rate);
            filtfilt_single(&notch, &stage2)
        } else {
            stage2
        };

        let quality = self.score_quality(&filtered);
        Ok((filtered, quality))
    }

    /// SNR, saturation, and flatness are all measured on the same filtered
    /// signal rather than mixing pre- and post-filter views.
    fn score_quality(&self, filtered: &[f64]) -> QualityReport {
        let snr_db = estimate_snr_db(filtered);

        let max_abs = filtered.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()));
        let near_max = filtered
            .iter()
            .filter(|&&v| max_abs > 0.0 && (v.abs() - max_abs).abs() <= 0.01 * max_abs)
            .count();
        let saturated = max_abs > 0.0 && (near_max as f64 / filtered.len() as f64) > 0.01;

        let mean_abs = mean(&filtered.iter().map(|v| v.abs()).collect::<Vec<_>>());
        let flat = mean_abs == 0.0 || (std_dev(filtered) / mean_abs) < 0.01;

        let mut score: i32 = 100;
        if snr_db < 15.0 {
            score -= 10;
            if snr_db < 10.0 {
                score -= 10;
                if snr_db < 5.0 {
                    score -= 20;
                }
            }
        }
        if saturated {
            score -= 30;
        }
        if flat {
            score -= 50;
        }
        let score = score.clamp(0, 100) as u8;

        QualityReport {
            snr_db,
            saturated,
            flat,
            score,
            acceptable: score >= 60,
        }
    }
}

/// `10*log10(var(x) / (var(diff(x))/2))`, 0 when the denominator is zero.
fn estimate_snr_db(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let signal_var = variance(x);
    let diffs: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let noise_var = variance(&diffs) / 2.0;
    if noise_var <= 0.0 {
        return 0.0;
    }
    10.0 * (signal_var / noise_var).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn synthetic_ecg(seconds: f64, fs: f64, bpm: f64, amplitude: f64) -> Vec<i32> {
        let n = (seconds * fs) as usize;
        let beat_period = 60.0 / bpm;
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                let phase = (t % beat_period) / beat_period;
                let qrs = (-((phase - 0.5).powi(2)) / (2.0 * 0.01 * 0.01)).exp();
                let noise = 0.01 * ((i as f64 * 12.9898).sin() * 43758.5453).fract();
                ((qrs * amplitude + noise) * 1000.0) as i32
            })
            .collect()
    }

    #[test]
    fn preserves_length() {
        let raw = synthetic_ecg(10.0, 500.0, 70.0, 1.0);
        let pp = Preprocessor::new(500.0);
        let (out, _) = pp.process(&raw).unwrap();
        assert_eq!(out.len(), raw.len());
    }

    #[test]
    fn empty_signal_errors() {
        let pp = Preprocessor::new(500.0);
        assert_eq!(pp.process(&[]).unwrap_err(), PipelineError::EmptySignal);
    }

    #[test]
    fn flat_signal_scores_low() {
        let raw = vec![0i32; 1500];
        let pp = Preprocessor::new(500.0);
        let (_, quality) = pp.process(&raw).unwrap();
        assert!(quality.score <= 10, "expected very low score, got {}", quality.score);
        assert!(!quality.acceptable);
    }

    #[test]
    fn clean_synthetic_ecg_scores_well() {
        let raw = synthetic_ecg(10.0, 500.0, 70.0, 1.0);
        let pp = Preprocessor::new(500.0);
        let (_, quality) = pp.process(&raw).unwrap();
        assert!(quality.score >= 60, "expected acceptable score, got {}", quality.score);
    }

    #[test]
    fn sixty_hz_tone_is_notched_down() {
        let fs = 500.0;
        let n = 1500;
        let raw: Vec<i32> = (0..n)
            .map(|i| ((2.0 * PI * 60.0 * i as f64 / fs).sin() * 1000.0) as i32)
            .collect();
        let pp = Preprocessor::new(fs);
        let (filtered, _) = pp.process(&raw).unwrap();
        let raw_f: Vec<f64> = raw.iter().map(|&v| v as f64).collect();
        let rms_in = (raw_f.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt();
        let rms_out = (filtered.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt();
        // -20dB is a 10x reduction in amplitude.
        assert!(rms_out < rms_in * 0.1, "rms_in={rms_in} rms_out={rms_out}");
    }
}
