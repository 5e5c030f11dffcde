//! Tracing subscriber setup for the relay binary.

use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => bail!("unknown log format {other:?} (expected \"pretty\" or \"json\")"),
        }
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let builder = fmt::fmt().with_env_filter(env_filter).with_target(false);
    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };

    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}
