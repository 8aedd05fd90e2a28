use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Environment variable holding a tracing filter, e.g. `treehole=debug`.
pub const LOG_ENV: &str = "TREEHOLE_LOG";

/// Installs the global subscriber. The terminal belongs to the UI, so events
/// go to the configured file; without one, logging stays off.
pub fn init(config: &LogConfig) -> Result<Option<PathBuf>> {
    let Some(path) = config.file.clone() else {
        return Ok(None);
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("logging: create directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("logging: open {}", path.display()))?;

    let filter = build_filter(&config.level);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|err| anyhow!("logging: install subscriber: {err}"))?;

    Ok(Some(path))
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_file_means_no_subscriber() {
        let config = LogConfig {
            level: "debug".into(),
            file: None,
        };
        assert_eq!(init(&config).unwrap(), None);
    }

    #[test]
    fn configured_level_is_the_default_filter() {
        if std::env::var_os(LOG_ENV).is_some() {
            return;
        }
        assert_eq!(build_filter("warn").to_string(), "warn");
    }

    #[test]
    fn writes_to_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("treehole.log");
        let config = LogConfig {
            level: "info".into(),
            file: Some(path.clone()),
        };
        // Another test may already own the global subscriber.
        if let Ok(installed) = init(&config) {
            assert_eq!(installed, Some(path.clone()));
        }
        assert!(path.exists());
    }
}
