//! On-disk JSON user store. Spec.md §3 "UserTemplate" and §6 "Persisted
//! state". Collaborator surface per spec.md §1, but implemented here in
//! full since the matcher owns it directly (spec.md §5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::Path;

/// Bound on the number of enrolled samples kept per user (spec.md §3/§4.6).
pub const MAX_SAMPLES_PER_USER: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSample {
    pub raw_vector: Vec<f64>,
    pub normalized_vector: Vec<f64>,
    pub hash_hex: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserTemplate {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub samples: VecDeque<UserSample>,
    pub login_count: u64,
    pub last_login: Option<DateTime<Utc>>,
}

impl UserTemplate {
    fn new(user_id: String, sample: UserSample, now: DateTime<Utc>) -> Self {
        let mut samples = VecDeque::with_capacity(MAX_SAMPLES_PER_USER);
        samples.push_back(sample);
        Self { user_id, created_at: now, updated_at: now, samples, login_count: 0, last_login: None }
    }

    /// Appends a sample, keeping only the `MAX_SAMPLES_PER_USER` most
    /// recent (FIFO), per spec.md §3/§8 scenario 6.
    fn push_sample(&mut self, sample: UserSample, now: DateTime<Utc>) {
        self.samples.push_back(sample);
        while self.samples.len() > MAX_SAMPLES_PER_USER {
            self.samples.pop_front();
        }
        self.updated_at = now;
    }
}

/// In-memory map of enrolled users, persisted to `users.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserStore {
    users: HashMap<String, UserTemplate>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the store from `path`. A missing file is treated as an empty
    /// store; malformed JSON is logged and treated as empty, per spec.md §7.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(store) => store,
                Err(err) => {
                    log::warn!("failed to parse user store at {}: {err}; starting empty", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Writes the store to `path` atomically: write to a sibling temp file,
    /// then rename over the destination (spec.md §6 "written atomically on
    /// every mutation").
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn get(&self, user_id: &str) -> Option<&UserTemplate> {
        self.users.get(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserTemplate> {
        self.users.values()
    }

    pub fn register(&mut self, user_id: String, sample: UserSample, now: DateTime<Utc>) {
        self.users.insert(user_id.clone(), UserTemplate::new(user_id, sample, now));
    }

    pub fn update(&mut self, user_id: &str, sample: UserSample, now: DateTime<Utc>) -> bool {
        match self.users.get_mut(user_id) {
            Some(template) => {
                template.push_sample(sample, now);
                true
            }
            None => false,
        }
    }

    pub fn record_login(&mut self, user_id: &str, now: DateTime<Utc>) {
        if let Some(template) = self.users.get_mut(user_id) {
            template.login_count += 1;
            template.last_login = Some(now);
        }
    }

    pub fn remove(&mut self, user_id: &str) -> Option<UserTemplate> {
        self.users.remove(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: f64) -> UserSample {
        UserSample {
            raw_vector: vec![v; 4],
            normalized_vector: vec![v; 4],
            hash_hex: format!("hash-{v}"),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn enrolling_sixth_sample_keeps_five_most_recent() {
        let mut store = UserStore::new();
        let now = Utc::now();
        store.register("alice".into(), sample(0.0), now);
        for i in 1..6 {
            store.update("alice", sample(i as f64), now);
        }
        let template = store.get("alice").unwrap();
        assert_eq!(template.samples.len(), MAX_SAMPLES_PER_USER);
        let values: Vec<f64> = template.samples.iter().map(|s| s.raw_vector[0]).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn register_then_delete_returns_to_empty() {
        let mut store = UserStore::new();
        let now = Utc::now();
        store.register("bob".into(), sample(1.0), now);
        assert!(store.contains("bob"));
        store.remove("bob");
        assert!(!store.contains("bob"));
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let mut store = UserStore::new();
        store.register("carol".into(), sample(2.0), Utc::now());
        store.save(&path).unwrap();

        let loaded = UserStore::load(&path);
        assert_eq!(loaded.get("carol").unwrap().samples, store.get("carol").unwrap().samples);
    }

    #[test]
    fn malformed_store_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "not json").unwrap();
        let loaded = UserStore::load(&path);
        assert!(!loaded.contains("anyone"));
    }
}
