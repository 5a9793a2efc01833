//! lbsyncd: keeps a load balancer in step with application lifecycle
//! events.
//!
//! # Usage
//!
//! ```text
//! lbsyncd run --config /etc/lbsync/lbsync.toml
//! lbsyncd run --config ./lbsync.toml --drain < events.jsonl
//! lbsyncd check-config --config ./lbsync.toml
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use lbsync_core::LbsyncConfig;
use lbsync_core::config::DEFAULT_CONFIG_PATH;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lbsyncd", about = "Load-balancer configuration daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop.
    Run {
        /// Configuration file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Exit once the event source is exhausted and all work has settled.
        #[arg(long)]
        drain: bool,
    },
    /// Load the configuration and print it with defaults filled in.
    CheckConfig {
        /// Configuration file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, drain } => {
            let (loaded, from_file) = load_config(&config)?;
            lbsyncd::logging::init(&loaded.log)?;
            if from_file {
                info!(path = %config.display(), "configuration loaded");
            } else {
                warn!(path = %config.display(), "no configuration file; using defaults");
            }

            let summary = lbsyncd::daemon::run_from_config(loaded, drain).await?;
            info!(outstanding = summary.outstanding, "lbsyncd stopped");
            Ok(())
        }
        Command::CheckConfig { config } => {
            let (loaded, _) = load_config(&config)?;
            print!("{}", loaded.to_toml_string()?);
            Ok(())
        }
    }
}

/// Read `path`; a missing file at the default location means defaults.
fn load_config(path: &Path) -> anyhow::Result<(LbsyncConfig, bool)> {
    if path == Path::new(DEFAULT_CONFIG_PATH) && !path.exists() {
        return Ok((LbsyncConfig::default(), false));
    }
    Ok((LbsyncConfig::from_file(path)?, true))
}
