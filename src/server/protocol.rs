//! Line protocol: command parsing and the JSON response vocabulary.
//! Spec.md §6.
//!
//! One UTF-8 line in, one UTF-8 JSON line out. Commands carry the literal
//! `CMD:` prefix; anything else is a signed decimal sample, and anything
//! that isn't even that is silently dropped (spec.md §6, §7 "Transport").

use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register(String),
    Login(Option<String>),
    Logout,
    Status,
    Users,
    Delete(String),
    Cancel,
    Verify,
    Complete,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Command(Command),
    Sample(i32),
    Ignored,
}

const COMMAND_PREFIX: &str = "CMD:";

/// Parses one input line per spec.md §6. `CMD:` (case-sensitive prefix,
/// case-insensitive verb) dispatches a command; a bare signed integer is a
/// sample; anything else is silently ignored rather than rejected.
pub fn parse_line(line: &str) -> Line {
    let line = line.trim();
    if line.is_empty() {
        return Line::Ignored;
    }
    if let Some(rest) = line.strip_prefix(COMMAND_PREFIX) {
        let mut parts = rest.splitn(2, ':');
        let verb = parts.next().unwrap_or("").trim().to_uppercase();
        let arg = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let command = match verb.as_str() {
            "REGISTER" => Command::Register(arg.unwrap_or_default()),
            "LOGIN" => Command::Login(arg),
            "LOGOUT" => Command::Logout,
            "STATUS" => Command::Status,
            "USERS" => Command::Users,
            "DELETE" => Command::Delete(arg.unwrap_or_default()),
            "CANCEL" => Command::Cancel,
            "VERIFY" => Command::Verify,
            "COMPLETE" => Command::Complete,
            _ => Command::Unknown(verb),
        };
        return Line::Command(command);
    }

    match line.parse::<i32>() {
        Ok(sample) => Line::Sample(sample),
        Err(_) => Line::Ignored,
    }
}

pub fn connected() -> Value {
    json!({"status": "connected"})
}

pub fn ready(mode: &str) -> Value {
    json!({"status": "ready", "mode": mode})
}

pub fn cancelled() -> Value {
    json!({"status": "cancelled"})
}

pub fn error(message: impl Into<String>) -> Value {
    json!({"status": "error", "message": message.into()})
}

pub fn info(message: impl Into<String>) -> Value {
    json!({"status": "info", "message": message.into()})
}

pub fn low_quality(score: u8) -> Value {
    json!({"status": "low_quality", "score": score})
}

pub fn insufficient_peaks(count: usize) -> Value {
    json!({"status": "insufficient_peaks", "count": count})
}

pub fn beat_processing_failed() -> Value {
    json!({"status": "beat_processing_failed"})
}

pub fn signature_failed() -> Value {
    json!({"status": "signature_failed"})
}

pub fn register_success(user_id: &str) -> Value {
    json!({"status": "success", "action": "register", "user_id": user_id})
}

pub fn delete_success(user_id: &str) -> Value {
    json!({"status": "success", "action": "delete", "user_id": user_id})
}

pub fn login_success(user_id: &str, similarity: f64, session_id: &str, expires_at: chrono::DateTime<chrono::Utc>) -> Value {
    json!({
        "status": "success",
        "action": "login",
        "user_id": user_id,
        "similarity": similarity,
        "session_id": session_id,
        "expires_at": expires_at.to_rfc3339(),
    })
}

pub fn auth_failed(best_similarity: f64, threshold: f64) -> Value {
    json!({"status": "auth_failed", "best_similarity": best_similarity, "threshold": threshold})
}

pub fn users(summaries: &[crate::auth::UserSummary]) -> Value {
    let list: Vec<Value> = summaries
        .iter()
        .map(|u| {
            json!({
                "user_id": u.user_id,
                "sample_count": u.sample_count,
                "login_count": u.login_count,
                "created_at": u.created_at.to_rfc3339(),
                "last_login": u.last_login.map(|t| t.to_rfc3339()),
            })
        })
        .collect();
    json!({"status": "success", "users": list})
}

pub fn status(mode: &str, buffered: usize, session_valid: bool) -> Value {
    json!({"status": "info", "mode": mode, "buffered_samples": buffered, "session_valid": session_valid})
}

pub fn valid(user_id: &str) -> Value {
    json!({"status": "valid", "user_id": user_id})
}

pub fn invalid() -> Value {
    json!({"status": "invalid"})
}

pub fn expired() -> Value {
    json!({"status": "expired"})
}
