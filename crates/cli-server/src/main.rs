//! CLI entry point for the Singalong media server
//!
//! Parses command line arguments, installs logging and starts the server.

use clap::Parser;
use singalong_server::{Config, Server};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Singalong - media delivery and shared song queue for a karaoke venue
#[derive(Parser, Debug)]
#[command(name = "singalong")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = "singalong.toml")]
    config: PathBuf,

    /// Interface to listen on (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

/// Installs the fmt subscriber; `RUST_LOG` wins over the configured level.
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_logging(&config.logging.level);

    tracing::info!(config = %args.config.display(), "Singalong starting");
    tracing::info!(videos = %config.media.videos_path, sounds = %config.media.sounds_path, "media roots");

    let server = Server::new(config);
    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "server stopped with an error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Singalong stopped");
    ExitCode::SUCCESS
}
