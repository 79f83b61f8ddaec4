//! Opaque session bookkeeping. Spec.md §3 "Session" and §4.6
//! verify_session/logout/cleanup_expired. Collaborator surface per
//! spec.md §1, owned entirely in memory by the matcher (spec.md §3).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// In-memory table of active sessions, keyed by opaque id.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, user_id: &str, timeout: Duration, now: DateTime<Utc>) -> Session {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + timeout,
        };
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Returns the session if it exists and is not expired. An
    /// expired-but-not-yet-swept session is removed on the spot (spec.md
    /// §5: "callers MAY still observe a not-yet-swept expired session, in
    /// which case verify_session must atomically detect expiry and delete").
    pub fn verify(&mut self, session_id: &str, now: DateTime<Utc>) -> VerifyOutcome {
        match self.sessions.get(session_id) {
            None => VerifyOutcome::Invalid,
            Some(session) if session.is_expired_at(now) => {
                self.sessions.remove(session_id);
                VerifyOutcome::Expired
            }
            Some(session) => VerifyOutcome::Valid(session.clone()),
        }
    }

    pub fn revoke(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Revokes every session belonging to `user_id` (spec.md §4.6
    /// delete_user "revokes all its sessions").
    pub fn revoke_all_for_user(&mut self, user_id: &str) {
        self.sessions.retain(|_, s| s.user_id != user_id);
    }

    /// Sweeps expired sessions, returning how many were removed. The only
    /// warning-worthy log site for this call is the count itself
    /// (spec.md §7).
    pub fn cleanup_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired_at(now));
        before - self.sessions.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Valid(Session),
    Invalid,
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_session_expires_one_hour_later() {
        let mut table = SessionTable::new();
        let now = Utc::now();
        let session = table.issue("alice", Duration::seconds(3600), now);
        assert_eq!(session.expires_at - session.created_at, Duration::seconds(3600));
    }

    #[test]
    fn verify_detects_expiry_and_deletes() {
        let mut table = SessionTable::new();
        let now = Utc::now();
        let session = table.issue("alice", Duration::seconds(60), now);
        let later = now + Duration::seconds(61);
        assert_eq!(table.verify(&session.id, later), VerifyOutcome::Expired);
        // Second lookup: already swept, reads as simply invalid.
        assert_eq!(table.verify(&session.id, later), VerifyOutcome::Invalid);
    }

    #[test]
    fn revoke_all_for_user_clears_only_that_user() {
        let mut table = SessionTable::new();
        let now = Utc::now();
        let a = table.issue("alice", Duration::seconds(3600), now);
        let b = table.issue("bob", Duration::seconds(3600), now);
        table.revoke_all_for_user("alice");
        assert_eq!(table.verify(&a.id, now), VerifyOutcome::Invalid);
        assert!(matches!(table.verify(&b.id, now), VerifyOutcome::Valid(_)));
    }
}
