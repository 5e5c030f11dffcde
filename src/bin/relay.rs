#![forbid(unsafe_code)]

//! Relay entry point: loads configuration, installs logging and serves until
//! Ctrl+C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::warn;
use yt_relay::{
    config::{DEFAULT_CONFIG_PATH, RelayConfig, load_relay_config_from},
    server,
    telemetry::{LogFormat, init_logging},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Local HTTP relay that drives yt-dlp.")]
struct Args {
    /// Env-style configuration file; missing files fall back to defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Directory yt-dlp writes into and results are served from.
    #[arg(long)]
    download_dir: Option<PathBuf>,
    /// Explicit yt-dlp binary, bypassing the bundled/PATH lookup.
    #[arg(long)]
    ytdlp: Option<PathBuf>,
    /// Built client bundle to serve for non-API paths.
    #[arg(long)]
    static_dir: Option<PathBuf>,
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(self, config: &mut RelayConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.download_dir {
            config.download_dir = dir;
        }
        if let Some(path) = self.ytdlp {
            config.ytdlp_path = Some(path);
        }
        if let Some(dir) = self.static_dir {
            config.static_dir = Some(dir);
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_relay_config_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);

    init_logging(config.log_format)?;

    let handle = server::start(&config).await.context("starting relay")?;
    shutdown_signal().await;
    handle.stop().await
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}
