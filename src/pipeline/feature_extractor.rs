//! Stage 4: derive morphological, rhythm (HRV), spectral, and statistical
//! descriptors from the beat template. Spec.md §4.4.
//!
//! Every group is a fixed-field struct (not a map) so the bundle's
//! dimensionality never varies: missing groups (e.g. HRV with fewer than
//! two peaks) are filled with defined zero sentinels, per spec.md §3.

use crate::pipeline::beat_processor::{Template, BEAT_LENGTH};
use crate::pipeline::r_peak_detector::RPeakSet;
use crate::pipeline::stats::{
    diff_usize, excess_kurtosis, fft_magnitudes, histogram_entropy, mean, skewness, std_dev,
    trapz_abs, zero_crossing_rate,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MorphologicalFeatures {
    pub p_amplitude: f64,
    pub q_amplitude: f64,
    pub r_amplitude: f64,
    pub s_amplitude: f64,
    pub t_amplitude: f64,
    pub pr_interval_ms: f64,
    pub qr_interval_ms: f64,
    pub rs_interval_ms: f64,
    pub qt_interval_ms: f64,
    pub st_interval_ms: f64,
    pub qrs_duration_ms: f64,
    pub qrs_area: f64,
    pub r_up_slope: f64,
    pub r_down_slope: f64,
    pub p_r_ratio: f64,
    pub t_r_ratio: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct HrvFeatures {
    pub mean_rr_ms: f64,
    pub std_rr_ms: f64,
    pub heart_rate_bpm: f64,
    pub sdnn_ms: f64,
    pub rmssd_ms: f64,
    pub pnn50: f64,
    pub pnn20: f64,
    pub cv: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FrequencyFeatures {
    pub band_power_0_5: f64,
    pub band_power_5_15: f64,
    pub band_power_15_40: f64,
    pub lf_hf_ratio: f64,
    pub spectral_centroid: f64,
    pub spectral_spread: f64,
    pub dominant_frequency: f64,
    pub top_coeffs: [f64; 5],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct StatisticalFeatures {
    pub mean: f64,
    pub std: f64,
    pub var: f64,
    pub max: f64,
    pub min: f64,
    pub range: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub energy: f64,
    pub rms: f64,
    pub zero_crossing_rate: f64,
    pub histogram_entropy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FeatureBundle {
    pub morphological: MorphologicalFeatures,
    pub hrv: HrvFeatures,
    pub frequency: FrequencyFeatures,
    pub statistical: StatisticalFeatures,
}

/// Seed position for the R landmark, as a fraction of `BEAT_LENGTH`.
const R_SEED_FRACTION: f64 = 0.38;
const R_SEARCH_RADIUS: usize = 20;

pub struct FeatureExtractor {
    sample_rate: f64,
}

impl FeatureExtractor {
    pub fn new(sample_rate: f64) -> Self {
        Self { sample_rate }
    }

    pub fn extract(&self, template: &Template, peaks: &RPeakSet) -> FeatureBundle {
        let morphological = self.morphological_features(&template.samples);
        let hrv = hrv_features(peaks, self.sample_rate);
        let frequency = frequency_features(&template.samples, self.sample_rate);
        let statistical = statistical_features(&template.samples);

        FeatureBundle { morphological, hrv, frequency, statistical }
    }

    fn morphological_features(&self, template: &[f64]) -> MorphologicalFeatures {
        let fs = self.sample_rate;
        let n = template.len().min(BEAT_LENGTH);
        if n < 10 {
            return MorphologicalFeatures::default();
        }

        let seed = ((R_SEED_FRACTION * BEAT_LENGTH as f64).round() as usize).min(n - 1);
        let r_idx = argmax_in(template, seed.saturating_sub(R_SEARCH_RADIUS), (seed + R_SEARCH_RADIUS).min(n - 1));

        let q_lo = r_idx.saturating_sub((0.1 * fs) as usize);
        let q_onset = if q_lo < r_idx { argmin_in(template, q_lo, r_idx - 1) } else { r_idx };

        let s_hi = (r_idx + (0.1 * fs) as usize).min(n - 1);
        let s_end = if s_hi > r_idx { argmin_in(template, r_idx + 1, s_hi) } else { r_idx };

        let p_lo = q_onset.saturating_sub((0.15 * fs) as usize);
        let (p_onset, p_peak, _p_offset) = if p_lo < q_onset {
            let peak = argmax_in(template, p_lo, q_onset.saturating_sub(1).max(p_lo));
            let onset = if peak > p_lo { argmin_in(template, p_lo, peak.saturating_sub(1).max(p_lo)) } else { peak };
            let offset = if peak < q_onset.saturating_sub(1) {
                argmin_in(template, peak + 1, q_onset.saturating_sub(1))
            } else {
                peak
            };
            (onset, peak, offset)
        } else {
            (q_onset, q_onset, q_onset)
        };

        let t_lo = (s_end + (0.02 * fs) as usize).min(n - 1);
        let t_hi = (s_end + (0.4 * fs) as usize).min(n - 1);
        let (t_peak, t_offset) = if t_hi > t_lo {
            let peak = argmax_in(template, t_lo, t_hi);
            let offset = if peak < t_hi { nearest_to_baseline(template, peak + 1, t_hi) } else { peak };
            (peak, offset)
        } else {
            (t_lo, t_lo)
        };

        let sample_ms = 1000.0 / fs;

        let p_amplitude = template[p_peak];
        let q_amplitude = template[q_onset];
        let r_amplitude = template[r_idx];
        let s_amplitude = template[s_end];
        let t_amplitude = template[t_peak];

        let pr_interval_ms = signed_gap(q_onset, p_onset) as f64 * sample_ms;
        let qr_interval_ms = signed_gap(r_idx, q_onset) as f64 * sample_ms;
        let rs_interval_ms = signed_gap(s_end, r_idx) as f64 * sample_ms;
        let qrs_duration_ms = qr_interval_ms + rs_interval_ms;
        let qt_interval_ms = signed_gap(t_offset, q_onset) as f64 * sample_ms;
        let st_interval_ms = signed_gap(t_peak, s_end) as f64 * sample_ms;

        let qrs_area = trapz_abs(&template[q_onset.min(s_end)..=s_end.max(q_onset)]);

        let r_up_slope = if r_idx > q_onset {
            (template[r_idx] - template[q_onset]) / (r_idx - q_onset) as f64
        } else {
            0.0
        };
        let r_down_slope = if s_end > r_idx {
            (template[s_end] - template[r_idx]) / (s_end - r_idx) as f64
        } else {
            0.0
        };

        let p_r_ratio = if r_amplitude.abs() > 1e-12 { p_amplitude / r_amplitude } else { 0.0 };
        let t_r_ratio = if r_amplitude.abs() > 1e-12 { t_amplitude / r_amplitude } else { 0.0 };

        MorphologicalFeatures {
            p_amplitude,
            q_amplitude,
            r_amplitude,
            s_amplitude,
            t_amplitude,
            pr_interval_ms,
            qr_interval_ms,
            rs_interval_ms,
            qt_interval_ms,
            st_interval_ms,
            qrs_duration_ms,
            qrs_area,
            r_up_slope,
            r_down_slope,
            p_r_ratio,
            t_r_ratio,
        }
    }
}

fn signed_gap(a: usize, b: usize) -> i64 {
    a as i64 - b as i64
}

fn argmax_in(x: &[f64], lo: usize, hi: usize) -> usize {
    if lo > hi || hi >= x.len() {
        return lo.min(x.len().saturating_sub(1));
    }
    let mut best = lo;
    for i in lo..=hi {
        if x[i] > x[best] {
            best = i;
        }
    }
    best
}

fn argmin_in(x: &[f64], lo: usize, hi: usize) -> usize {
    if lo > hi || hi >= x.len() {
        return lo.min(x.len().saturating_sub(1));
    }
    let mut best = lo;
    for i in lo..=hi {
        if x[i] < x[best] {
            best = i;
        }
    }
    best
}

/// Point in `[lo, hi]` whose value is nearest to zero (the local baseline),
/// used for the T-wave offset search (spec.md §4.4).
fn nearest_to_baseline(x: &[f64], lo: usize, hi: usize) -> usize {
    if lo > hi || hi >= x.len() {
        return lo.min(x.len().saturating_sub(1));
    }
    let mut best = lo;
    for i in lo..=hi {
        if x[i].abs() < x[best].abs() {
            best = i;
        }
    }
    best
}

/// HRV over `diff(peaks)/fs*1000`, filtered to the 300-2000ms physiological
/// window. Returns the zero record when fewer than two valid RR intervals
/// remain (spec.md §4.4).
fn hrv_features(peaks: &RPeakSet, fs: f64) -> HrvFeatures {
    if peaks.len() < 2 {
        return HrvFeatures::default();
    }
    let rr_samples = diff_usize(&peaks.indices);
    let rr_ms: Vec<f64> = rr_samples
        .iter()
        .map(|&s| s / fs * 1000.0)
        .filter(|&ms| (300.0..=2000.0).contains(&ms))
        .collect();
    if rr_ms.len() < 2 {
        return HrvFeatures::default();
    }

    let mean_rr_ms = mean(&rr_ms);
    let std_rr_ms = std_dev(&rr_ms);
    let heart_rate_bpm = if mean_rr_ms > 0.0 { 60000.0 / mean_rr_ms } else { 0.0 };
    let sdnn_ms = std_rr_ms;

    let successive_diffs: Vec<f64> = rr_ms.windows(2).map(|w| w[1] - w[0]).collect();
    let rmssd_ms = if successive_diffs.is_empty() {
        0.0
    } else {
        (successive_diffs.iter().map(|d| d * d).sum::<f64>() / successive_diffs.len() as f64).sqrt()
    };
    let pnn50 = nn_fraction(&successive_diffs, 50.0);
    let pnn20 = nn_fraction(&successive_diffs, 20.0);
    let cv = if mean_rr_ms > 0.0 { std_rr_ms / mean_rr_ms } else { 0.0 };

    HrvFeatures { mean_rr_ms, std_rr_ms, heart_rate_bpm, sdnn_ms, rmssd_ms, pnn50, pnn20, cv }
}

fn nn_fraction(successive_diffs: &[f64], threshold_ms: f64) -> f64 {
    if successive_diffs.is_empty() {
        return 0.0;
    }
    let count = successive_diffs.iter().filter(|d| d.abs() > threshold_ms).count();
    count as f64 / successive_diffs.len() as f64
}

fn frequency_features(template: &[f64], fs: f64) -> FrequencyFeatures {
    let magnitudes = fft_magnitudes(template);
    if magnitudes.len() < 2 {
        return FrequencyFeatures::default();
    }
    let n = template.len();
    let bin_hz = fs / n as f64;

    let total_power: f64 = magnitudes.iter().map(|m| m * m).sum();
    let band_power = |lo_hz: f64, hi_hz: f64| -> f64 {
        if total_power <= 0.0 {
            return 0.0;
        }
        let power: f64 = magnitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let f = *i as f64 * bin_hz;
                f >= lo_hz && f < hi_hz
            })
            .map(|(_, m)| m * m)
            .sum();
        power / total_power
    };

    let band_power_0_5 = band_power(0.0, 5.0);
    let band_power_5_15 = band_power(5.0, 15.0);
    let band_power_15_40 = band_power(15.0, 40.0);

    let lf_power: f64 = magnitudes
        .iter()
        .enumerate()
        .filter(|(i, _)| *i as f64 * bin_hz < 15.0)
        .map(|(_, m)| m * m)
        .sum();
    let hf_power: f64 = magnitudes
        .iter()
        .enumerate()
        .filter(|(i, _)| *i as f64 * bin_hz >= 15.0)
        .map(|(_, m)| m * m)
        .sum();
    let lf_hf_ratio = if hf_power > 0.0 { lf_power / hf_power } else { 0.0 };

    let freqs: Vec<f64> = (0..magnitudes.len()).map(|i| i as f64 * bin_hz).collect();
    let mag_sum: f64 = magnitudes.iter().sum();
    let spectral_centroid = if mag_sum > 0.0 {
        freqs.iter().zip(&magnitudes).map(|(f, m)| f * m).sum::<f64>() / mag_sum
    } else {
        0.0
    };
    let spectral_spread = if mag_sum > 0.0 {
        let variance = freqs
            .iter()
            .zip(&magnitudes)
            .map(|(f, m)| (f - spectral_centroid).powi(2) * m)
            .sum::<f64>()
            / mag_sum;
        variance.sqrt()
    } else {
        0.0
    };

    let dominant_bin = magnitudes
        .iter()
        .enumerate()
        .skip(1) // skip DC
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0);
    let dominant_frequency = dominant_bin as f64 * bin_hz;

    let max_mag = magnitudes.iter().cloned().fold(0.0_f64, f64::max);
    let mut sorted: Vec<f64> = magnitudes.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    let mut top_coeffs = [0.0; 5];
    for (slot, &m) in top_coeffs.iter_mut().zip(sorted.iter()) {
        *slot = if max_mag > 0.0 { m / max_mag } else { 0.0 };
    }

    FrequencyFeatures {
        band_power_0_5,
        band_power_5_15,
        band_power_15_40,
        lf_hf_ratio,
        spectral_centroid,
        spectral_spread,
        dominant_frequency,
        top_coeffs,
    }
}

fn statistical_features(template: &[f64]) -> StatisticalFeatures {
    if template.is_empty() {
        return StatisticalFeatures::default();
    }
    let m = mean(template);
    let s = std_dev(template);
    let max = template.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = template.iter().cloned().fold(f64::INFINITY, f64::min);
    let energy: f64 = template.iter().map(|v| v * v).sum();
    let rms = (energy / template.len() as f64).sqrt();

    StatisticalFeatures {
        mean: m,
        std: s,
        var: s * s,
        max,
        min,
        range: max - min,
        skewness: skewness(template),
        excess_kurtosis: excess_kurtosis(template),
        energy,
        rms,
        zero_crossing_rate: zero_crossing_rate(template),
        histogram_entropy: histogram_entropy(template, 50),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::beat_processor::BEAT_LENGTH;

    fn synthetic_template() -> Template {
        let samples: Vec<f64> = (0..BEAT_LENGTH)
            .map(|i| {
                let t = i as f64;
                let r = (-((t - 114.0).powi(2)) / (2.0 * 4.0 * 4.0)).exp() * 5.0;
                let p = (-((t - 70.0).powi(2)) / (2.0 * 8.0 * 8.0)).exp() * 0.8;
                let tw = (-((t - 180.0).powi(2)) / (2.0 * 20.0 * 20.0)).exp() * 1.2;
                r + p + tw
            })
            .collect();
        Template { samples, surviving_beats: 5, rejected_beats: 0 }
    }

    #[test]
    fn missing_hrv_group_is_zero_filled_but_same_shape() {
        let extractor = FeatureExtractor::new(500.0);
        let template = synthetic_template();

        let with_hrv = extractor.extract(&template, &RPeakSet { indices: vec![100, 600, 1100] });
        let without_hrv = extractor.extract(&template, &RPeakSet { indices: vec![100] });

        assert!(with_hrv.hrv.mean_rr_ms > 0.0);
        assert_eq!(without_hrv.hrv, HrvFeatures::default());
    }

    #[test]
    fn r_peak_is_near_seed_position() {
        let extractor = FeatureExtractor::new(500.0);
        let template = synthetic_template();
        let bundle = extractor.extract(&template, &RPeakSet { indices: vec![100, 600] });
        assert!(bundle.morphological.r_amplitude > bundle.morphological.p_amplitude);
    }
}
