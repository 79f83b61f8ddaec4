//! Typed error taxonomy for the ECG pipeline and auth matcher.
//!
//! Each variant maps directly onto a `status` value in the line protocol
//! (see `server::protocol`). Stages never wrap a lower error in prose; the
//! reason is forwarded upward unmodified.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("signal is empty")]
    EmptySignal,
    #[error("signal quality too low (score {score})")]
    LowQuality { score: u8 },
    #[error("fewer than 3 R-peaks detected ({count})")]
    InsufficientPeaks { count: usize },
    #[error("beat processing failed: no beat survived outlier rejection")]
    BeatProcessingFailed,
    #[error("signature composition failed")]
    SignatureFailed,
}

impl PipelineError {
    /// The `status` string this error maps to in the line protocol.
    pub fn status(&self) -> &'static str {
        match self {
            PipelineError::EmptySignal => "error",
            PipelineError::LowQuality { .. } => "low_quality",
            PipelineError::InsufficientPeaks { .. } => "insufficient_peaks",
            PipelineError::BeatProcessingFailed => "beat_processing_failed",
            PipelineError::SignatureFailed => "signature_failed",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatcherError {
    #[error("user_id must not be empty")]
    EmptyUserId,
    #[error("user '{0}' is not enrolled")]
    UnknownUser(String),
    #[error("user '{0}' is already enrolled")]
    DuplicateUser(String),
    #[error("authentication failed (best similarity {best_similarity:.4} < {threshold:.4})")]
    AuthFailed { best_similarity: f64, threshold: f64 },
    #[error("session is not valid")]
    InvalidSession,
    #[error("session has expired")]
    ExpiredSession,
}

impl MatcherError {
    pub fn status(&self) -> &'static str {
        match self {
            MatcherError::EmptyUserId | MatcherError::UnknownUser(_) | MatcherError::DuplicateUser(_) => "error",
            MatcherError::AuthFailed { .. } => "auth_failed",
            MatcherError::InvalidSession => "invalid",
            MatcherError::ExpiredSession => "expired",
        }
    }
}
