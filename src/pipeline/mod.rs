//! The six-stage ECG signal pipeline: preprocessing, R-peak detection,
//! beat processing, feature extraction, and signature composition.
//! Spec.md §2. Every stage is a pure function of its input — no stage
//! holds state across calls, so a `Pipeline` is safe to share across
//! concurrent connections (spec.md §5).

pub mod beat_processor;
pub mod biquad;
pub mod feature_extractor;
pub mod preprocessor;
pub mod r_peak_detector;
pub mod signature_composer;
pub mod stats;

pub use beat_processor::{BeatProcessor, Template, BEAT_LENGTH};
pub use feature_extractor::{FeatureBundle, FeatureExtractor};
pub use preprocessor::{Preprocessor, QualityReport};
pub use r_peak_detector::{DetectionReport, RPeakDetector, RPeakSet};
pub use signature_composer::{cosine_similarity, euclidean_distance, SignatureComposer, SignatureRecord};

use crate::error::PipelineError;

/// A single successful run of the pipeline, with the intermediate reports
/// a caller (or the line protocol layer) needs for diagnostics.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub quality: QualityReport,
    pub detection: DetectionReport,
    pub peaks: RPeakSet,
    pub template: Template,
    pub features: FeatureBundle,
    pub signature: SignatureRecord,
}

/// Chains preprocessor -> detector -> beat processor -> feature extractor
/// -> signature composer, short-circuiting on the first failure and
/// forwarding its reason upward unmodified (spec.md §7).
pub struct Pipeline {
    preprocessor: Preprocessor,
    detector: RPeakDetector,
    beat_processor: BeatProcessor,
    feature_extractor: FeatureExtractor,
    composer: SignatureComposer,
}

impl Pipeline {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            preprocessor: Preprocessor::new(sample_rate),
            detector: RPeakDetector::new(sample_rate),
            beat_processor: BeatProcessor::new(sample_rate),
            feature_extractor: FeatureExtractor::new(sample_rate),
            composer: SignatureComposer::new(),
        }
    }

    pub fn run(&self, raw: &[i32]) -> Result<PipelineOutcome, PipelineError> {
        let (filtered, quality) = self.preprocessor.process(raw)?;
        log::debug!("preprocessor: score={} snr_db={:.2}", quality.score, quality.snr_db);
        if !quality.acceptable {
            return Err(PipelineError::LowQuality { score: quality.score });
        }

        let (peaks, detection) = self.detector.detect(&filtered);
        log::debug!("detector: count={} mean_hr_bpm={:.1}", detection.count, detection.mean_hr_bpm);
        if peaks.len() < 3 {
            return Err(PipelineError::InsufficientPeaks { count: peaks.len() });
        }

        let template = self.beat_processor.process(&filtered, &peaks)?;
        log::debug!(
            "beat_processor: surviving={} rejected={}",
            template.surviving_beats,
            template.rejected_beats
        );

        let features = self.feature_extractor.extract(&template, &peaks);
        let signature = self.composer.compose(&features);

        Ok(PipelineOutcome { quality, detection, peaks, template, features, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn synthetic_ecg(seconds: f64, fs: f64, bpm: f64, amplitude: f64, p_scale: f64, t_scale: f64) -> Vec<i32> {
        let n = (seconds * fs) as usize;
        let beat_period = 60.0 / bpm;
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                let phase = (t % beat_period) / beat_period;
                let qrs = (-((phase - 0.5).powi(2)) / (2.0 * 0.01 * 0.01)).exp() * amplitude;
                let p = (-((phase - 0.35).powi(2)) / (2.0 * 0.02 * 0.02)).exp() * p_scale;
                let tw = (-((phase - 0.65).powi(2)) / (2.0 * 0.04 * 0.04)).exp() * t_scale;
                ((qrs + p + tw) * 1000.0) as i32
            })
            .collect()
    }

    #[test]
    fn clean_signal_runs_end_to_end() {
        let raw = synthetic_ecg(10.0, 500.0, 70.0, 1.0, 0.2, 0.3);
        let pipeline = Pipeline::new(500.0);
        let outcome = pipeline.run(&raw).expect("pipeline should succeed");
        assert!(outcome.quality.acceptable);
        assert_eq!(outcome.signature.raw_vector.len(), signature_composer::SIGNATURE_DIM);
    }

    #[test]
    fn flat_signal_is_low_quality() {
        let raw = vec![0i32; 1500];
        let pipeline = Pipeline::new(500.0);
        let err = pipeline.run(&raw).unwrap_err();
        assert_eq!(err.status(), "low_quality");
    }

    #[test]
    fn sixty_hz_tone_yields_insufficient_peaks() {
        let fs = 500.0;
        let n = 1500;
        let raw: Vec<i32> = (0..n)
            .map(|i| ((2.0 * PI * 60.0 * i as f64 / fs).sin() * 1000.0) as i32)
            .collect();
        let pipeline = Pipeline::new(fs);
        let err = pipeline.run(&raw).unwrap_err();
        assert_eq!(err.status(), "insufficient_peaks");
    }

    #[test]
    fn same_signal_reprocessed_yields_identical_signature() {
        let raw = synthetic_ecg(10.0, 500.0, 70.0, 1.0, 0.2, 0.3);
        let pipeline = Pipeline::new(500.0);
        let a = pipeline.run(&raw).unwrap();
        let b = pipeline.run(&raw).unwrap();
        assert_eq!(a.signature.hash_hex, b.signature.hash_hex);
        assert_eq!(a.signature.raw_vector, b.signature.raw_vector);
    }
}
