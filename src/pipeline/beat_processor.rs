//! Stage 3: extract beats around each R-peak, align and resample them,
//! reject outliers, and form a single representative template beat.
//! Spec.md §4.3.

use crate::error::PipelineError;
use crate::pipeline::r_peak_detector::RPeakSet;
use crate::pipeline::stats::{mad, median, resample_linear, rmse, zscore};
use serde::{Deserialize, Serialize};

/// Fixed beat/template length, spec.md §3.
pub const BEAT_LENGTH: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub samples: Vec<f64>,
    pub surviving_beats: usize,
    pub rejected_beats: usize,
}

pub struct BeatProcessor {
    sample_rate: f64,
}

impl BeatProcessor {
    pub fn new(sample_rate: f64) -> Self {
        Self { sample_rate }
    }

    pub fn process(&self, signal: &[f64], peaks: &RPeakSet) -> Result<Template, PipelineError> {
        let fs = self.sample_rate;
        let pre = (0.25 * fs).floor() as usize;
        let post = (0.40 * fs).floor() as usize;

        // 1. Extract fixed windows, discarding any that cross the signal boundary.
        let raw_beats: Vec<Vec<f64>> = peaks
            .indices
            .iter()
            .filter_map(|&p| {
                let start = p.checked_sub(pre)?;
                let end = p + post;
                if end > signal.len() {
                    return None;
                }
                Some(signal[start..end].to_vec())
            })
            .collect();

        if raw_beats.is_empty() {
            return Err(PipelineError::BeatProcessingFailed);
        }

        // 2-3. Per-beat Z-score normalize, then resample to BEAT_LENGTH.
        let beats: Vec<Vec<f64>> = raw_beats
            .iter()
            .map(|b| resample_linear(&zscore(b), BEAT_LENGTH))
            .collect();

        // 4. Outlier rejection via modified Z-score on beat-to-median RMSE.
        let (survivors, distances, rejected) = reject_outliers(&beats);
        if survivors.is_empty() {
            return Err(PipelineError::BeatProcessingFailed);
        }

        // 5. Weighted average of survivors; weights proportional to 1/(d+eps).
        let template_samples = if survivors.len() == 1 {
            survivors[0].clone()
        } else {
            weighted_average(&survivors, &distances)
        };

        Ok(Template {
            samples: template_samples,
            surviving_beats: survivors.len(),
            rejected_beats: rejected,
        })
    }
}

/// Returns `(surviving beats, their distances to the median beat, rejected count)`.
fn reject_outliers(beats: &[Vec<f64>]) -> (Vec<Vec<f64>>, Vec<f64>, usize) {
    if beats.len() < 3 {
        let distances = vec![0.0; beats.len()];
        return (beats.to_vec(), distances, 0);
    }

    let median_beat = elementwise_median(beats);
    let d: Vec<f64> = beats.iter().map(|b| rmse(b, &median_beat)).collect();
    let median_d = median(&d);
    let mad_d = mad(&d);

    if mad_d == 0.0 {
        return (beats.to_vec(), d, 0);
    }

    let mut survivors = Vec::new();
    let mut survivor_distances = Vec::new();
    let mut rejected = 0;
    for (beat, &di) in beats.iter().zip(&d) {
        let modified_z = 0.6745 * (di - median_d) / mad_d;
        if modified_z > 2.0 {
            rejected += 1;
        } else {
            survivors.push(beat.clone());
            survivor_distances.push(di);
        }
    }
    (survivors, survivor_distances, rejected)
}

fn elementwise_median(beats: &[Vec<f64>]) -> Vec<f64> {
    let len = beats[0].len();
    (0..len)
        .map(|i| {
            let column: Vec<f64> = beats.iter().map(|b| b[i]).collect();
            median(&column)
        })
        .collect()
}

fn weighted_average(beats: &[Vec<f64>], distances: &[f64]) -> Vec<f64> {
    let weights: Vec<f64> = distances.iter().map(|&d| 1.0 / (d + 1e-8)).collect();
    let total: f64 = weights.iter().sum();
    let normalized: Vec<f64> = weights.iter().map(|w| w / total).collect();

    let len = beats[0].len();
    (0..len)
        .map(|i| {
            beats
                .iter()
                .zip(&normalized)
                .map(|(beat, &w)| beat[i] * w)
                .sum()
        })
        .collect()
}
