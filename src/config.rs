use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::extractor::locate_extractor;
use crate::telemetry::LogFormat;

pub const DEFAULT_CONFIG_PATH: &str = "relay.env";
pub const DEFAULT_RELAY_HOST: &str = "127.0.0.1";
pub const DEFAULT_RELAY_PORT: u16 = 3001;
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
pub const DEFAULT_BIN_DIR: &str = "bin";

/// Values as written in the env file; anything absent falls back to a default.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub relay_host: Option<String>,
    pub relay_port: Option<u16>,
    pub download_dir: Option<PathBuf>,
    pub ytdlp_path: Option<PathBuf>,
    pub ytdlp_bin_dir: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub download_dir: PathBuf,
    pub ytdlp_path: Option<PathBuf>,
    pub ytdlp_bin_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolves the extractor binary. Call after logging is up: the `PATH`
    /// fallback emits a warning.
    pub fn extractor(&self) -> PathBuf {
        locate_extractor(self.ytdlp_path.as_deref(), &self.ytdlp_bin_dir)
    }
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value_raw)) = trimmed.split_once('=') else {
            continue;
        };
        let value = value_raw.trim().trim_matches('"');
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "RELAY_HOST" => cfg.relay_host = Some(value.to_string()),
            "RELAY_PORT" => {
                let port: u16 = value
                    .parse()
                    .with_context(|| format!("Parsing RELAY_PORT from {}", path.display()))?;
                cfg.relay_port = Some(port);
            }
            "DOWNLOAD_DIR" => cfg.download_dir = Some(PathBuf::from(value)),
            "YTDLP_PATH" => cfg.ytdlp_path = Some(PathBuf::from(value)),
            "YTDLP_BIN_DIR" => cfg.ytdlp_bin_dir = Some(PathBuf::from(value)),
            "STATIC_DIR" => cfg.static_dir = Some(PathBuf::from(value)),
            "LOG_FORMAT" => {
                let format: LogFormat = value
                    .parse()
                    .with_context(|| format!("Parsing LOG_FORMAT from {}", path.display()))?;
                cfg.log_format = Some(format);
            }
            _ => {}
        }
    }
    Ok(Some(cfg))
}

/// Loads `path`, treating a missing file as "all defaults".
pub fn load_relay_config_from(path: impl AsRef<Path>) -> Result<RelayConfig> {
    let cfg = read_env_config(path.as_ref())?.unwrap_or_default();
    Ok(cfg.resolve())
}

impl EnvConfig {
    pub fn resolve(self) -> RelayConfig {
        RelayConfig {
            host: self
                .relay_host
                .unwrap_or_else(|| DEFAULT_RELAY_HOST.to_string()),
            port: self.relay_port.unwrap_or(DEFAULT_RELAY_PORT),
            download_dir: self
                .download_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            ytdlp_path: self.ytdlp_path,
            ytdlp_bin_dir: self
                .ytdlp_bin_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BIN_DIR)),
            static_dir: self.static_dir,
            log_format: self.log_format.unwrap_or_default(),
        }
    }
}
