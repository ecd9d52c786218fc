//! switchyardd — the Switchyard daemon.
//!
//! Single binary that assembles:
//! - State store (redb)
//! - Workflow management client and SMS notifier
//! - Lifecycle controller + reconciliation loop
//! - REST API
//!
//! # Usage
//!
//! ```text
//! switchyardd run --config /etc/switchyard/switchyard.toml
//! switchyardd check-config --config switchyard.toml
//! switchyardd scaffold > switchyard.toml
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use switchyard_core::SwitchyardConfig;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,switchyardd=debug,switchyard=debug";

#[derive(Parser)]
#[command(name = "switchyardd", about = "Switchyard cutover daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reconciliation loop and the API server.
    Run {
        /// Path to switchyard.toml.
        #[arg(long, default_value = "switchyard.toml")]
        config: PathBuf,

        /// Port to listen on (overrides `server.port`).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides `server.data_dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },

    /// Load and validate a config file, then exit.
    CheckConfig {
        #[arg(long, default_value = "switchyard.toml")]
        config: PathBuf,
    },

    /// Print a starter config with placeholder endpoints to stdout.
    Scaffold,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
            log_json,
        } => {
            init_tracing(log_json);
            let mut config = daemon::load_config(&config)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            daemon::run(config).await
        }
        Command::CheckConfig { config: path } => {
            init_tracing(false);
            let config = daemon::load_config(&path)?;
            println!(
                "{}: ok (port {}, tick every {}s)",
                path.display(),
                config.server.port,
                config.monitor.interval_secs
            );
            Ok(())
        }
        Command::Scaffold => {
            print!("{}", SwitchyardConfig::scaffold().to_toml_string()?);
            Ok(())
        }
    }
}
