//! Child-process gateway to the yt-dlp binary.
//!
//! The gateway only knows how to run a [`CompiledCommand`] and report the exit
//! status. Files written by a download run are a side effect it does not look
//! at; see [`crate::dispatch`].

use std::{
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::compiler::CompiledCommand;

/// File name of the extractor, both on `PATH` and inside a bundled bin directory.
pub const EXTRACTOR_BINARY: &str = if cfg!(windows) {
    "yt-dlp.exe"
} else {
    "yt-dlp"
};

#[derive(Debug, Error)]
pub enum ExecutionFailure {
    #[error("could not start extractor {}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("extractor exited with {status}")]
    Exited { status: ExitStatus, stderr: String },
}

impl ExecutionFailure {
    /// Diagnostic text captured from the failed run, for server-side logs only.
    pub fn stderr(&self) -> &str {
        match self {
            Self::Spawn { .. } => "",
            Self::Exited { stderr, .. } => stderr,
        }
    }
}

/// Output of a run that exited with status 0.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct Extractor {
    binary: PathBuf,
}

impl Extractor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Runs the extractor to completion. There is no timeout, and dropping the
    /// returned future does not kill the child.
    pub async fn run(&self, command: &CompiledCommand) -> Result<RawOutput, ExecutionFailure> {
        info!(binary = %self.binary.display(), args = ?command.args(), "running extractor");

        let output = Command::new(&self.binary)
            .args(command.args())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecutionFailure::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ExecutionFailure::Exited {
                status: output.status,
                stderr,
            });
        }

        debug!(stdout_bytes = stdout.len(), "extractor finished");
        Ok(RawOutput { stdout, stderr })
    }

    /// Runs `<binary> --version`; used at startup to report which extractor is live.
    pub async fn version(&self) -> Result<String, ExecutionFailure> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecutionFailure::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExecutionFailure::Exited {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

/// Picks the extractor binary: an explicit path wins, then a bundled copy in
/// `bin_dir`, then whatever `yt-dlp` resolves to on `PATH`.
pub fn locate_extractor(explicit: Option<&Path>, bin_dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let bundled = bin_dir.join(EXTRACTOR_BINARY);
    if bundled.is_file() {
        return bundled;
    }

    warn!(
        bin_dir = %bin_dir.display(),
        "bundled extractor not found, falling back to {EXTRACTOR_BINARY} on PATH"
    );
    PathBuf::from(EXTRACTOR_BINARY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_analyze;
    use std::fs;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[cfg(unix)]
    fn install_stub(dir: &Path, body: &str) -> PathBuf {
        let script_path = dir.join("yt-dlp");
        fs::write(&script_path, format!("#!/usr/bin/env bash\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();
        script_path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_returns_stdout_on_success() {
        let dir = tempdir().unwrap();
        let stub = install_stub(dir.path(), r#"printf '%s|' "$@""#);
        let extractor = Extractor::new(stub);

        let output = extractor
            .run(&compile_analyze("https://youtu.be/a b"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "--dump-json|https://youtu.be/a b|");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_reports_non_zero_exit_with_stderr() {
        let dir = tempdir().unwrap();
        let stub = install_stub(dir.path(), "echo 'ERROR: unsupported URL' >&2\nexit 1");
        let extractor = Extractor::new(stub);

        let err = extractor
            .run(&compile_analyze("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::Exited { .. }));
        assert!(err.stderr().contains("unsupported URL"));
    }

    #[tokio::test]
    async fn run_reports_missing_binary() {
        let dir = tempdir().unwrap();
        let extractor = Extractor::new(dir.path().join("does-not-exist"));
        let err = extractor
            .run(&compile_analyze("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::Spawn { .. }));
        assert_eq!(err.stderr(), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn version_is_trimmed() {
        let dir = tempdir().unwrap();
        let stub = install_stub(dir.path(), "echo '  2024.08.06  '");
        let extractor = Extractor::new(stub);
        assert_eq!(extractor.version().await.unwrap(), "2024.08.06");
    }

    #[test]
    fn locate_prefers_explicit_then_bundled_then_path() {
        let dir = tempdir().unwrap();
        let explicit = dir.path().join("custom-yt-dlp");
        assert_eq!(
            locate_extractor(Some(&explicit), dir.path()),
            explicit
        );

        assert_eq!(
            locate_extractor(None, dir.path()),
            PathBuf::from(EXTRACTOR_BINARY)
        );

        let bundled = dir.path().join(EXTRACTOR_BINARY);
        fs::write(&bundled, "").unwrap();
        assert_eq!(locate_extractor(None, dir.path()), bundled);
    }
}
