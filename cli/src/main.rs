mod commands;
mod signals;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use llama_launcher_core::{BinaryKind, Config};
use tracing_subscriber::EnvFilter;

use commands::{run::RunArgs, serve::ServeArgs};

#[derive(Parser)]
#[command(name = "llama-launcher")]
#[command(author, version, about = "Launch and monitor llama.cpp binaries", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/llama-launcher/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single prompt with llama-cli
    Run(RunArgs),

    /// Start llama-server and monitor its endpoint
    Serve(ServeArgs),

    /// Show which binary would be used
    Locate {
        /// Binary to look for
        #[arg(value_enum, default_value = "cli")]
        binary: Target,
    },

    /// Check a server endpoint once
    Health {
        /// Server host (default from config)
        #[arg(long)]
        host: Option<String>,

        /// Server port (default from config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show the effective configuration
    Config {
        /// Config key (e.g., "server.port", "inference.temperature")
        key: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Cli,
    Server,
}

impl From<Target> for BinaryKind {
    fn from(target: Target) -> Self {
        match target {
            Target::Cli => BinaryKind::Cli,
            Target::Server => BinaryKind::Server,
        }
    }
}

/// `RUST_LOG` wins when set and valid; otherwise `level` applies.
fn log_filter(rust_log: Option<&str>, level: tracing::Level) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the relayed process output.
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref(), level))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    let code = match cli.command {
        Commands::Run(args) => commands::run::execute(&config, args).await?,
        Commands::Serve(args) => commands::serve::execute(cli.config.as_deref(), config, args).await?,
        Commands::Locate { binary } => commands::locate::execute(&config, binary.into()),
        Commands::Health { host, port } => commands::health::execute(&config, host, port).await,
        Commands::Config { key } => commands::config::execute(&config, key.as_deref())?,
    };

    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_overrides_default_level() {
        let filter = log_filter(Some("warn"), tracing::Level::INFO);
        assert_eq!(filter.max_level_hint(), Some(tracing::level_filters::LevelFilter::WARN));
    }

    #[test]
    fn test_default_level_without_rust_log() {
        let filter = log_filter(None, tracing::Level::DEBUG);
        assert_eq!(filter.max_level_hint(), Some(tracing::level_filters::LevelFilter::DEBUG));

        let filter = log_filter(Some("llama_launcher=loud"), tracing::Level::INFO);
        assert_eq!(filter.max_level_hint(), Some(tracing::level_filters::LevelFilter::INFO));
    }
}
