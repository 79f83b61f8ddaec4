//! Stage 5: weight, concatenate, normalize, discretize, and hash the
//! feature bundle into a fixed-dimension signature. Spec.md §4.5.
//!
//! The enumeration order below is the public contract: a feature's
//! position in the vector never changes between builds, or every stored
//! template becomes incomparable with newly composed signatures.

use crate::pipeline::feature_extractor::FeatureBundle;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Morphological group contributes 16 scalars, HRV 6, frequency 12
/// (7 scalars + 5 top coefficients), statistical 8. `D = 16+6+12+8 = 42`.
pub const SIGNATURE_DIM: usize = 42;

const MORPHOLOGICAL_WEIGHT: f64 = 1.5;
const HRV_WEIGHT: f64 = 1.0;
const FREQUENCY_WEIGHT: f64 = 0.8;
const STATISTICAL_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignatureRecord {
    pub raw_vector: Vec<f64>,
    pub normalized_vector: Vec<f64>,
    pub discretized: Vec<u8>,
    pub hash_hex: String,
    pub hash_b64: String,
}

pub struct SignatureComposer;

impl SignatureComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(&self, bundle: &FeatureBundle) -> SignatureRecord {
        let raw_vector = enumerate_weighted(bundle);
        let sanitized = sanitize(&raw_vector);
        let normalized_vector = min_max_normalize(&sanitized);
        let discretized = discretize(&normalized_vector);

        let mut hasher = Sha256::new();
        hasher.update(&discretized);
        let digest = hasher.finalize();
        let hash_hex = hex_encode(&digest);
        let hash_b64 = BASE64.encode(digest);

        SignatureRecord {
            raw_vector: sanitized,
            normalized_vector,
            discretized,
            hash_hex,
            hash_b64,
        }
    }
}

impl Default for SignatureComposer {
    fn default() -> Self {
        Self::new()
    }
}

/// Enumerates features in the fixed, weighted order: morphological (16) x1.5,
/// hrv (6) x1.0, frequency (7+5) x0.8, statistical (8) x0.7.
fn enumerate_weighted(bundle: &FeatureBundle) -> Vec<f64> {
    let m = &bundle.morphological;
    let morphological = [
        m.p_amplitude,
        m.q_amplitude,
        m.r_amplitude,
        m.s_amplitude,
        m.t_amplitude,
        m.pr_interval_ms,
        m.qr_interval_ms,
        m.rs_interval_ms,
        m.qt_interval_ms,
        m.st_interval_ms,
        m.qrs_duration_ms,
        m.qrs_area,
        m.r_up_slope,
        m.r_down_slope,
        m.p_r_ratio,
        m.t_r_ratio,
    ];

    let h = &bundle.hrv;
    let hrv = [h.mean_rr_ms, h.std_rr_ms, h.heart_rate_bpm, h.sdnn_ms, h.rmssd_ms, h.pnn50];

    let f = &bundle.frequency;
    let mut frequency = vec![
        f.band_power_0_5,
        f.band_power_5_15,
        f.band_power_15_40,
        f.lf_hf_ratio,
        f.spectral_centroid,
        f.spectral_spread,
        f.dominant_frequency,
    ];
    frequency.extend_from_slice(&f.top_coeffs);

    let s = &bundle.statistical;
    let statistical = [
        s.mean,
        s.std,
        s.skewness,
        s.excess_kurtosis,
        s.energy,
        s.rms,
        s.zero_crossing_rate,
        s.histogram_entropy,
    ];

    let mut out = Vec::with_capacity(SIGNATURE_DIM);
    out.extend(morphological.iter().map(|v| v * MORPHOLOGICAL_WEIGHT));
    out.extend(hrv.iter().map(|v| v * HRV_WEIGHT));
    out.extend(frequency.iter().map(|v| v * FREQUENCY_WEIGHT));
    out.extend(statistical.iter().map(|v| v * STATISTICAL_WEIGHT));
    debug_assert_eq!(out.len(), SIGNATURE_DIM);
    out
}

fn sanitize(x: &[f64]) -> Vec<f64> {
    x.iter().map(|&v| if v.is_finite() { v } else { 0.0 }).collect()
}

fn min_max_normalize(x: &[f64]) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if span <= 0.0 {
        return vec![0.0; x.len()];
    }
    x.iter().map(|&v| (v - min) / span).collect()
}

fn discretize(normalized: &[f64]) -> Vec<u8> {
    normalized
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Cosine similarity between two equal-length vectors; 0 when either norm
/// is 0. Used only by the matcher's comparison utility, never the composer
/// itself (spec.md §4.5).
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Euclidean distance between two equal-length vectors.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}
