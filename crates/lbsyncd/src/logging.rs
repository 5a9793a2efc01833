use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::Context;
use lbsync_core::config::{LogConfig, LogFormat};
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG` when set, otherwise from `log.level`.
pub fn filter(config: &LogConfig) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log.level `{}`", config.level)),
    }
}

/// Install the global subscriber described by `[log]`.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match (&config.file, config.format) {
        (None, LogFormat::Text) => builder.with_writer(std::io::stderr).try_init(),
        (None, LogFormat::Json) => builder.json().with_writer(std::io::stderr).try_init(),
        (Some(path), format) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let writer = Arc::new(file);
            match format {
                LogFormat::Text => builder.with_ansi(false).with_writer(writer).try_init(),
                LogFormat::Json => builder.json().with_writer(writer).try_init(),
            }
        }
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}
