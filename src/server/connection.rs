//! Per-connection state machine and sample buffering. Spec.md §4.6 state
//! machine (`idle -> {registering, logging_in} -> idle`) and §6 buffering
//! rule (ring bounded at 2x the window size; the matcher runs once the
//! window fills, or on `CMD:COMPLETE` with at least the window buffered).

use crate::auth::AuthMatcher;
use crate::pipeline::Pipeline;
use crate::server::protocol::{self, Command, Line};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Idle,
    Registering { user_id: String },
    LoggingIn { user_id: Option<String> },
}

impl Mode {
    fn label(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Registering { .. } => "registering",
            Mode::LoggingIn { .. } => "logging_in",
        }
    }
}

pub struct ConnectionHandler {
    pipeline: Arc<Pipeline>,
    matcher: Arc<AuthMatcher>,
    window_size: usize,
    mode: Mode,
    buffer: VecDeque<i32>,
    session_id: Option<String>,
}

impl ConnectionHandler {
    pub fn new(pipeline: Arc<Pipeline>, matcher: Arc<AuthMatcher>, window_size: usize) -> Self {
        Self {
            pipeline,
            matcher,
            window_size,
            mode: Mode::Idle,
            buffer: VecDeque::with_capacity(window_size * 2),
            session_id: None,
        }
    }

    pub fn welcome(&self) -> Value {
        protocol::connected()
    }

    /// Processes a single input line, returning zero or one response lines
    /// to write back (every command/sample batch produces at most one JSON
    /// line, per spec.md §7).
    pub fn handle_line(&mut self, line: &str) -> Option<Value> {
        match protocol::parse_line(line) {
            Line::Command(cmd) => Some(self.handle_command(cmd)),
            Line::Sample(sample) => {
                self.push_sample(sample);
                if self.should_run_on_fill() {
                    Some(self.run_pipeline())
                } else {
                    None
                }
            }
            Line::Ignored => None,
        }
    }

    fn push_sample(&mut self, sample: i32) {
        self.buffer.push_back(sample);
        while self.buffer.len() > self.window_size * 2 {
            self.buffer.pop_front();
        }
    }

    fn should_run_on_fill(&self) -> bool {
        matches!(self.mode, Mode::Registering { .. } | Mode::LoggingIn { .. })
            && self.buffer.len() >= self.window_size
    }

    fn handle_command(&mut self, cmd: Command) -> Value {
        match cmd {
            Command::Register(user_id) => {
                self.buffer.clear();
                self.mode = Mode::Registering { user_id };
                protocol::ready(self.mode.label())
            }
            Command::Login(user_id) => {
                self.buffer.clear();
                self.mode = Mode::LoggingIn { user_id };
                protocol::ready(self.mode.label())
            }
            Command::Cancel => {
                self.buffer.clear();
                self.mode = Mode::Idle;
                protocol::cancelled()
            }
            Command::Complete => self.handle_complete(),
            Command::Logout => match self.session_id.take() {
                Some(id) => {
                    self.matcher.logout(&id);
                    protocol::info("logged out")
                }
                None => protocol::error("no active session"),
            },
            Command::Status => {
                let session_valid = self
                    .session_id
                    .as_ref()
                    .map(|id| matches!(self.matcher.verify_session(id), crate::auth::VerifyOutcome::Valid(_)))
                    .unwrap_or(false);
                protocol::status(self.mode.label(), self.buffer.len(), session_valid)
            }
            Command::Users => protocol::users(&self.matcher.list_users()),
            Command::Delete(user_id) => match self.matcher.delete_user(&user_id, self.session_id.as_deref()) {
                Ok(()) => protocol::delete_success(&user_id),
                Err(err) => protocol::error(err.to_string()),
            },
            Command::Verify => match self.session_id.as_ref() {
                None => protocol::invalid(),
                Some(id) => match self.matcher.verify_session(id) {
                    crate::auth::VerifyOutcome::Valid(session) => protocol::valid(&session.user_id),
                    crate::auth::VerifyOutcome::Invalid => protocol::invalid(),
                    crate::auth::VerifyOutcome::Expired => protocol::expired(),
                },
            },
            Command::Unknown(verb) => protocol::error(format!("unknown command: {verb}")),
        }
    }

    /// `CMD:COMPLETE` while idle is an error (spec.md §4.6 "a COMPLETE
    /// event while not in one of the two active states is an error");
    /// while active it triggers processing only if the window has at
    /// least `window_size` buffered samples (spec.md §6).
    fn handle_complete(&mut self) -> Value {
        if matches!(self.mode, Mode::Idle) {
            return protocol::error("COMPLETE received outside registration/login");
        }
        if self.buffer.len() < self.window_size {
            return protocol::error(format!(
                "insufficient samples buffered ({} < {})",
                self.buffer.len(),
                self.window_size
            ));
        }
        self.run_pipeline()
    }

    fn run_pipeline(&mut self) -> Value {
        let samples: Vec<i32> = self.buffer.iter().copied().collect();
        self.buffer.clear();
        let mode = std::mem::replace(&mut self.mode, Mode::Idle);

        let outcome = match self.pipeline.run(&samples) {
            Ok(outcome) => outcome,
            Err(err) => return pipeline_error_response(&err),
        };

        match mode {
            Mode::Registering { user_id } => match self.matcher.register(&user_id, &outcome.signature) {
                Ok(()) => protocol::register_success(&user_id),
                Err(err) => protocol::error(err.to_string()),
            },
            Mode::LoggingIn { user_id } => match self.matcher.login(&outcome.signature, user_id.as_deref()) {
                Ok(success) => {
                    self.session_id = Some(success.session.id.clone());
                    protocol::login_success(
                        &success.user_id,
                        success.similarity,
                        &success.session.id,
                        success.session.expires_at,
                    )
                }
                Err(err) => match err {
                    crate::error::MatcherError::AuthFailed { best_similarity, threshold } => {
                        protocol::auth_failed(best_similarity, threshold)
                    }
                    other => protocol::error(other.to_string()),
                },
            },
            Mode::Idle => unreachable!("run_pipeline only called from an active mode"),
        }
    }
}

fn pipeline_error_response(err: &crate::error::PipelineError) -> Value {
    use crate::error::PipelineError;
    match err {
        PipelineError::LowQuality { score } => protocol::low_quality(*score),
        PipelineError::InsufficientPeaks { count } => protocol::insufficient_peaks(*count),
        PipelineError::BeatProcessingFailed => protocol::beat_processing_failed(),
        PipelineError::SignatureFailed => protocol::signature_failed(),
        PipelineError::EmptySignal => protocol::error(err.to_string()),
    }
}
