//! §4.6 Auth Matcher: registers templates, compares candidates, and
//! returns accept/reject decisions. Owns the user store and session
//! table behind a single exclusive lock (spec.md §5 — no other lock is
//! ever acquired by this crate).

use crate::auth::session::{Session, SessionTable, VerifyOutcome};
use crate::auth::store::{UserSample, UserStore};
use crate::error::MatcherError;
use crate::pipeline::SignatureRecord;
use chrono::{Duration, Utc};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub similarity_threshold: f64,
    pub session_timeout: Duration,
    pub users_path: PathBuf,
}

struct MatcherState {
    store: UserStore,
    sessions: SessionTable,
}

pub struct AuthMatcher {
    state: Mutex<MatcherState>,
    config: MatcherConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginSuccess {
    pub user_id: String,
    pub similarity: f64,
    pub session: Session,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub user_id: String,
    pub sample_count: usize,
    pub login_count: u64,
    pub created_at: chrono::DateTime<Utc>,
    pub last_login: Option<chrono::DateTime<Utc>>,
}

impl AuthMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        let store = UserStore::load(&config.users_path);
        Self { state: Mutex::new(MatcherState { store, sessions: SessionTable::new() }), config }
    }

    /// Enrolls a new user from a freshly composed signature. Fails if
    /// `user_id` is empty or already present (case-folded to lowercase).
    /// Never partially mutates state on failure.
    pub fn register(&self, user_id: &str, signature: &SignatureRecord) -> Result<(), MatcherError> {
        if user_id.trim().is_empty() {
            return Err(MatcherError::EmptyUserId);
        }
        let key = user_id.to_lowercase();
        let mut state = self.state.lock().unwrap();
        if state.store.contains(&key) {
            return Err(MatcherError::DuplicateUser(user_id.to_string()));
        }
        let now = Utc::now();
        state.store.register(key, sample_from_signature(signature, now), now);
        self.persist(&state.store);
        Ok(())
    }

    /// Compares `signature`'s raw feature vector against one user's stored
    /// samples (or all enrolled users when `user_id` is `None`), accepting
    /// when the best `hybrid_similarity` meets the configured threshold.
    pub fn login(&self, signature: &SignatureRecord, user_id: Option<&str>) -> Result<LoginSuccess, MatcherError> {
        let mut state = self.state.lock().unwrap();

        let candidates: Vec<String> = match user_id {
            Some(uid) => {
                let key = uid.to_lowercase();
                if !state.store.contains(&key) {
                    return Err(MatcherError::UnknownUser(uid.to_string()));
                }
                vec![key]
            }
            None => state.store.iter().map(|t| t.user_id.clone()).collect(),
        };

        let mut best: Option<(String, f64)> = None;
        for uid in &candidates {
            if let Some(template) = state.store.get(uid) {
                for sample in &template.samples {
                    let similarity = hybrid_similarity(&signature.raw_vector, &sample.raw_vector);
                    let is_better = best.as_ref().map_or(true, |(_, b)| similarity > *b);
                    if is_better {
                        best = Some((uid.clone(), similarity));
                    }
                }
            }
        }

        let threshold = self.config.similarity_threshold;
        match best {
            Some((uid, similarity)) if similarity >= threshold => {
                let now = Utc::now();
                state.store.record_login(&uid, now);
                let session = state.sessions.issue(&uid, self.config.session_timeout, now);
                self.persist(&state.store);
                Ok(LoginSuccess { user_id: uid, similarity, session })
            }
            Some((_, similarity)) => Err(MatcherError::AuthFailed { best_similarity: similarity, threshold }),
            None => Err(MatcherError::AuthFailed { best_similarity: 0.0, threshold }),
        }
    }

    /// Appends a sample to an already-enrolled user, keeping the five most
    /// recent (spec.md §4.6, §8 scenario 6). `session` is optional (spec.md
    /// §4.6 `update_template(user_id, signature, session?)`); when given it
    /// must be a valid, unexpired session for that same user.
    pub fn update_template(
        &self,
        user_id: &str,
        signature: &SignatureRecord,
        session_id: Option<&str>,
    ) -> Result<(), MatcherError> {
        let key = user_id.to_lowercase();
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        if let Some(sid) = session_id {
            Self::authorize(&mut state.sessions, sid, &key, now)?;
        }
        if !state.store.update(&key, sample_from_signature(signature, now), now) {
            return Err(MatcherError::UnknownUser(user_id.to_string()));
        }
        self.persist(&state.store);
        Ok(())
    }

    /// Removes a user and revokes all of their sessions. `session` is
    /// optional, same contract as `update_template`.
    pub fn delete_user(&self, user_id: &str, session_id: Option<&str>) -> Result<(), MatcherError> {
        let key = user_id.to_lowercase();
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        if let Some(sid) = session_id {
            Self::authorize(&mut state.sessions, sid, &key, now)?;
        }
        if state.store.remove(&key).is_none() {
            return Err(MatcherError::UnknownUser(user_id.to_string()));
        }
        state.sessions.revoke_all_for_user(&key);
        self.persist(&state.store);
        Ok(())
    }

    /// Confirms `session_id` is valid, unexpired, and owned by `user_id`.
    fn authorize(
        sessions: &mut SessionTable,
        session_id: &str,
        user_id: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), MatcherError> {
        match sessions.verify(session_id, now) {
            VerifyOutcome::Valid(session) if session.user_id == user_id => Ok(()),
            VerifyOutcome::Valid(_) => Err(MatcherError::InvalidSession),
            VerifyOutcome::Invalid => Err(MatcherError::InvalidSession),
            VerifyOutcome::Expired => Err(MatcherError::ExpiredSession),
        }
    }

    pub fn verify_session(&self, session_id: &str) -> VerifyOutcome {
        let mut state = self.state.lock().unwrap();
        state.sessions.verify(session_id, Utc::now())
    }

    pub fn logout(&self, session_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.sessions.revoke(session_id)
    }

    /// Sweeps expired sessions; the count is one of the few things spec.md
    /// §7 permits logging as a warning.
    pub fn cleanup_expired_sessions(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        let removed = state.sessions.cleanup_expired(Utc::now());
        if removed > 0 {
            log::warn!("cleanup_expired_sessions: swept {removed} expired session(s)");
        }
        removed
    }

    pub fn list_users(&self) -> Vec<UserSummary> {
        let state = self.state.lock().unwrap();
        state
            .store
            .iter()
            .map(|t| UserSummary {
                user_id: t.user_id.clone(),
                sample_count: t.samples.len(),
                login_count: t.login_count,
                created_at: t.created_at,
                last_login: t.last_login,
            })
            .collect()
    }

    fn persist(&self, store: &UserStore) {
        if let Err(err) = store.save(&self.config.users_path) {
            log::warn!("failed to save user store at {}: {err}", self.config.users_path.display());
        }
    }
}

fn sample_from_signature(signature: &SignatureRecord, now: chrono::DateTime<Utc>) -> UserSample {
    UserSample {
        raw_vector: signature.raw_vector.clone(),
        normalized_vector: signature.normalized_vector.clone(),
        hash_hex: signature.hash_hex.clone(),
        registered_at: now,
    }
}

/// The discriminative contract (spec.md §4.6): truncate to the common
/// prefix, Z-score standardize each vector independently, then blend
/// cosine similarity and a scaled Euclidean distance.
pub fn hybrid_similarity(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let a = &a[..len];
    let b = &b[..len];

    let za = standardize(a);
    let zb = standardize(b);

    let cosine = {
        let dot: f64 = za.iter().zip(&zb).map(|(x, y)| x * y).sum();
        let norm_a = za.iter().map(|x| x * x).sum::<f64>().sqrt();
        let norm_b = zb.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    };

    let euclidean = {
        let dist: f64 = za.iter().zip(&zb).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt();
        1.0 / (1.0 + dist / 15.0)
    };

    (0.7 * cosine + 0.3 * euclidean).clamp(0.0, 1.0)
}

fn standardize(x: &[f64]) -> Vec<f64> {
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    let variance = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / x.len() as f64;
    let std = variance.sqrt();
    x.iter().map(|v| (v - mean) / (std + 1e-10)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> MatcherConfig {
        MatcherConfig {
            similarity_threshold: 0.85,
            session_timeout: Duration::seconds(3600),
            users_path: dir.join("users.json"),
        }
    }

    fn signature(values: &[f64]) -> SignatureRecord {
        SignatureRecord {
            raw_vector: values.to_vec(),
            normalized_vector: values.to_vec(),
            discretized: vec![0; values.len()],
            hash_hex: "deadbeef".into(),
            hash_b64: "3q2+7w==".into(),
        }
    }

    #[test]
    fn hybrid_similarity_is_reflexive_symmetric_and_bounded() {
        let v = vec![1.0, 2.0, 3.0, -1.5, 0.2, 7.0];
        let w = vec![0.1, -2.0, 3.3, 1.0, 0.0, 5.0];
        assert!((hybrid_similarity(&v, &v) - 1.0).abs() < 1e-9);
        let sim_vw = hybrid_similarity(&v, &w);
        let sim_wv = hybrid_similarity(&w, &v);
        assert!((sim_vw - sim_wv).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&sim_vw));
    }

    #[test]
    fn register_then_login_with_same_signature_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let matcher = AuthMatcher::new(config(dir.path()));
        let sig = signature(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        matcher.register("alice", &sig).unwrap();

        let result = matcher.login(&sig, Some("alice")).unwrap();
        assert_eq!(result.user_id, "alice");
        assert!(result.similarity >= 0.85);
    }

    #[test]
    fn login_with_unrelated_signature_fails() {
        let dir = tempfile::tempdir().unwrap();
        let matcher = AuthMatcher::new(config(dir.path()));
        let sig = signature(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        matcher.register("alice", &sig).unwrap();

        let unrelated = signature(&[-8.0, 12.0, -3.0, 0.1, 9.0]);
        let err = matcher.login(&unrelated, Some("alice")).unwrap_err();
        match err {
            MatcherError::AuthFailed { best_similarity, threshold } => {
                assert!(best_similarity < threshold);
            }
            other => panic!("expected AuthFailed, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let matcher = AuthMatcher::new(config(dir.path()));
        let sig = signature(&[1.0, 2.0, 3.0]);
        matcher.register("alice", &sig).unwrap();
        let err = matcher.register("ALICE", &sig).unwrap_err();
        assert_eq!(err, MatcherError::DuplicateUser("ALICE".to_string()));
    }

    #[test]
    fn delete_user_revokes_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let matcher = AuthMatcher::new(config(dir.path()));
        let sig = signature(&[1.0, 2.0, 3.0, 4.0]);
        matcher.register("alice", &sig).unwrap();
        let login = matcher.login(&sig, Some("alice")).unwrap();

        matcher.delete_user("alice", None).unwrap();
        assert_eq!(matcher.verify_session(&login.session.id), VerifyOutcome::Invalid);
    }

    #[test]
    fn update_template_rejects_another_users_session() {
        let dir = tempfile::tempdir().unwrap();
        let matcher = AuthMatcher::new(config(dir.path()));
        let alice_sig = signature(&[1.0, 2.0, 3.0, 4.0]);
        let bob_sig = signature(&[9.0, 8.0, 7.0, 6.0]);
        matcher.register("alice", &alice_sig).unwrap();
        matcher.register("bob", &bob_sig).unwrap();
        let bob_login = matcher.login(&bob_sig, Some("bob")).unwrap();

        let err = matcher
            .update_template("alice", &alice_sig, Some(&bob_login.session.id))
            .unwrap_err();
        assert_eq!(err, MatcherError::InvalidSession);
    }
}
