//! ECG biometric authentication: a six-stage signal pipeline that turns a
//! short window of raw ECG samples into a fixed-dimension biometric
//! signature, plus the matcher, session, and store that turn signatures
//! into accept/reject decisions over a line-oriented TCP protocol.
//!
//! See `spec.md` / `SPEC_FULL.md` §2 for the dataflow and `DESIGN.md` for
//! where each piece is grounded.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod server;
