//! Boundary scenarios from spec.md §8, items 4-6, plus the hybrid
//! similarity properties §8 calls out directly.

use ecg_auth::auth::{AuthMatcher, MatcherConfig};
use ecg_auth::auth::matcher::hybrid_similarity;
use ecg_auth::pipeline::Pipeline;
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

fn matcher(dir: &std::path::Path) -> AuthMatcher {
    AuthMatcher::new(MatcherConfig {
        similarity_threshold: 0.85,
        session_timeout: chrono::Duration::seconds(3600),
        users_path: dir.join("users.json"),
    })
}

#[test]
fn scenario_4_register_then_login_with_same_template_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let m = matcher(dir.path());
    let pipeline = Pipeline::new(500.0);

    let raw = synthetic_ecg(10.0, 500.0, 70.0, 1.0, 0.2, 0.3);
    let outcome = pipeline.run(&raw).unwrap();

    m.register("alice", &outcome.signature).unwrap();
    let login = m.login(&outcome.signature, Some("alice")).unwrap();

    assert_eq!(login.user_id, "alice");
    assert!(login.similarity >= 0.85);
    let expected_expiry = login.session.created_at + chrono::Duration::seconds(3600);
    assert_eq!(login.session.expires_at, expected_expiry);
}

#[test]
fn scenario_5_login_with_unrelated_signal_fails() {
    let dir = tempfile::tempdir().unwrap();
    let m = matcher(dir.path());
    let pipeline = Pipeline::new(500.0);

    let alice_raw = synthetic_ecg(10.0, 500.0, 70.0, 1.0, 0.2, 0.3);
    let alice_outcome = pipeline.run(&alice_raw).unwrap();
    m.register("alice", &alice_outcome.signature).unwrap();

    let stranger_raw = synthetic_ecg(10.0, 500.0, 110.0, 0.6, 0.6, 0.05);
    let stranger_outcome = pipeline.run(&stranger_raw).unwrap();

    let err = m.login(&stranger_outcome.signature, Some("alice")).unwrap_err();
    match err {
        ecg_auth::error::MatcherError::AuthFailed { best_similarity, threshold } => {
            assert!(best_similarity < threshold, "best_similarity={best_similarity}");
        }
        other => panic!("expected AuthFailed, got {other:?}"),
    }
}

#[test]
fn scenario_6_sixth_enrollment_keeps_five_most_recent() {
    let dir = tempfile::tempdir().unwrap();
    let m = matcher(dir.path());
    let pipeline = Pipeline::new(500.0);

    let base = pipeline.run(&synthetic_ecg(10.0, 500.0, 70.0, 1.0, 0.2, 0.3)).unwrap();
    m.register("alice", &base.signature).unwrap();

    let mut last_hashes = Vec::new();
    for bpm in [71.0, 72.0, 73.0, 74.0, 75.0] {
        let outcome = pipeline.run(&synthetic_ecg(10.0, 500.0, bpm, 1.0, 0.2, 0.3)).unwrap();
        last_hashes.push(outcome.signature.hash_hex.clone());
        m.update_template("alice", &outcome.signature, None).unwrap();
    }

    let users = m.list_users();
    let alice = users.iter().find(|u| u.user_id == "alice").unwrap();
    assert_eq!(alice.sample_count, 5);
}

#[test]
fn hybrid_similarity_is_reflexive_symmetric_and_bounded_for_varied_vectors() {
    let vectors = [
        vec![1.0, 2.0, 3.0, 4.0, 5.0],
        vec![-3.0, 0.0, 7.5, 2.2, -1.1],
        vec![0.1; 6],
    ];
    for v in &vectors {
        if v.iter().all(|&x| x == v[0]) {
            continue; // degenerate (zero-variance) vectors standardize to all-zero
        }
        assert!((hybrid_similarity(v, v) - 1.0).abs() < 1e-9);
    }
    for a in &vectors {
        for b in &vectors {
            let sim_ab = hybrid_similarity(a, b);
            let sim_ba = hybrid_similarity(b, a);
            assert!((sim_ab - sim_ba).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&sim_ab));
        }
    }
}

#[test]
fn empty_vectors_yield_zero_similarity() {
    assert_eq!(hybrid_similarity(&[], &[1.0, 2.0]), 0.0);
    assert_eq!(hybrid_similarity(&[], &[]), 0.0);
}

#[test]
fn register_then_delete_returns_store_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let m = matcher(dir.path());
    let pipeline = Pipeline::new(500.0);
    let outcome = pipeline.run(&synthetic_ecg(10.0, 500.0, 70.0, 1.0, 0.2, 0.3)).unwrap();

    m.register("carol", &outcome.signature).unwrap();
    assert_eq!(m.list_users().len(), 1);
    m.delete_user("carol", None).unwrap();
    assert_eq!(m.list_users().len(), 0);
}
