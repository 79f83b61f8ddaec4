//! Runtime configuration knobs.
//!
//! Defaults match spec.md §6. Values can be overridden by a TOML file
//! (`--config <path>`) and then by individual CLI flags layered on top.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default sampling rate, in Hz.
pub const DEFAULT_SAMPLING_RATE: f64 = 500.0;
/// Default ring-buffer window size, in samples (~3s at 500 Hz).
pub const DEFAULT_BUFFER_SIZE: usize = 1500;
/// Default acceptance threshold for `hybrid_similarity`.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
/// Default session lifetime, in seconds.
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sampling_rate: f64,
    pub buffer_size: usize,
    pub similarity_threshold: f64,
    pub session_timeout_secs: i64,
    pub data_dir: PathBuf,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling_rate: DEFAULT_SAMPLING_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:7000".to_string(),
        }
    }
}

impl Config {
    /// Loads a config from a TOML file, falling back to defaults for any
    /// field it doesn't specify. A missing file is not an error; it just
    /// means "use defaults" (the store itself logs its own load failures,
    /// this is a distinct, silent convenience for the config file).
    pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(toml_from_str(&text)?),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }
}

/// Minimal TOML reader: the crate's only TOML need is a flat key=value
/// config file, so this avoids pulling in the `toml` crate for a handful
/// of scalar fields.
fn toml_from_str(text: &str) -> anyhow::Result<Config> {
    let mut cfg = Config::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"');
        match key {
            "sampling_rate" => cfg.sampling_rate = value.parse().unwrap_or(cfg.sampling_rate),
            "buffer_size" => cfg.buffer_size = value.parse().unwrap_or(cfg.buffer_size),
            "similarity_threshold" => {
                cfg.similarity_threshold = value.parse().unwrap_or(cfg.similarity_threshold)
            }
            "session_timeout_secs" => {
                cfg.session_timeout_secs = value.parse().unwrap_or(cfg.session_timeout_secs)
            }
            "data_dir" => cfg.data_dir = PathBuf::from(value),
            "bind_addr" => cfg.bind_addr = value.to_string(),
            _ => {}
        }
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.sampling_rate, 500.0);
        assert_eq!(cfg.buffer_size, 1500);
        assert_eq!(cfg.similarity_threshold, 0.85);
        assert_eq!(cfg.session_timeout_secs, 3600);
    }

    #[test]
    fn parses_flat_key_value_toml() {
        let cfg = toml_from_str(
            "sampling_rate = 250\nbuffer_size = 750\nsimilarity_threshold = 0.9\ndata_dir = \"/tmp/ecg\"\n",
        )
        .unwrap();
        assert_eq!(cfg.sampling_rate, 250.0);
        assert_eq!(cfg.buffer_size, 750);
        assert_eq!(cfg.similarity_threshold, 0.9);
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/ecg"));
    }
}
