//! Logging initialization.
//!
//! The rest of the crate speaks only to the `log` facade (`log::debug!`,
//! `log::warn!`, ...); this module wires up the one concrete backend the
//! binary uses. Kept separate from `main.rs` so tests can call it too
//! without pulling in CLI argument parsing.

pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
