//! Binary entry point: CLI args, config/logging wiring, and the tokio
//! TCP listener that fronts the pipeline and matcher (spec.md §6).

use ecg_auth::auth::{AuthMatcher, MatcherConfig};
use ecg_auth::config::Config;
use ecg_auth::pipeline::Pipeline;
use ecg_auth::server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn parse_args() -> anyhow::Result<Config> {
    let mut args = std::env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut overrides: Vec<(String, String)> = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = args.next().map(PathBuf::from);
            }
            flag if flag.starts_with("--") => {
                let key = flag.trim_start_matches("--").to_string();
                if let Some(value) = args.next() {
                    overrides.push((key, value));
                }
            }
            _ => {}
        }
    }

    let mut config = match config_path {
        Some(path) => Config::load_from_file(&path)?,
        None => Config::default(),
    };

    for (key, value) in overrides {
        match key.as_str() {
            "sampling-rate" => config.sampling_rate = value.parse()?,
            "buffer-size" => config.buffer_size = value.parse()?,
            "similarity-threshold" => config.similarity_threshold = value.parse()?,
            "session-timeout" => config.session_timeout_secs = value.parse()?,
            "data-dir" => config.data_dir = PathBuf::from(value),
            "bind" => config.bind_addr = value,
            other => log::warn!("ignoring unknown flag --{other}"),
        }
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ecg_auth::logging::init();
    let config = parse_args()?;

    log::info!(
        "starting ecg-auth-server: fs={}Hz buffer={} threshold={} data_dir={}",
        config.sampling_rate,
        config.buffer_size,
        config.similarity_threshold,
        config.data_dir.display()
    );

    let pipeline = Arc::new(Pipeline::new(config.sampling_rate));
    let matcher = Arc::new(AuthMatcher::new(MatcherConfig {
        similarity_threshold: config.similarity_threshold,
        session_timeout: chrono::Duration::seconds(config.session_timeout_secs),
        users_path: config.users_path(),
    }));

    {
        let matcher = Arc::clone(&matcher);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                matcher.cleanup_expired_sessions();
            }
        });
    }

    server::serve(&config.bind_addr, pipeline, matcher, config.buffer_size).await?;
    Ok(())
}
