//! Docker container restart through the Docker CLI.
//!
//! The CLI talks to the host daemon over the mounted `docker.sock`, so the
//! watcher needs no Docker API client of its own. Every invocation is bounded
//! by the configured timeout; a hung daemon must not stall the watcher.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use crate::config::DockerConfig;
use crate::error::DockerError;
use crate::system::locate_program;

/// Output of a finished docker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (-1 if killed by a signal).
    pub exit_code: i32,
}

impl CommandOutput {
    /// Returns `true` if the command exited successfully (exit code 0).
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, trimmed.
    #[must_use]
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// Picks the container to restart from the running container names.
///
/// An exact name match wins. Otherwise exactly one name containing
/// `pattern` is required.
///
/// # Errors
///
/// - `DockerError::NoRunningContainers` if `names` is empty
/// - `DockerError::NoMatch` if no name contains `pattern`
/// - `DockerError::Ambiguous` if several names contain `pattern`
pub fn resolve_container_name(pattern: &str, names: &[String]) -> Result<String, DockerError> {
    if names.is_empty() {
        return Err(DockerError::NoRunningContainers);
    }

    if names.iter().any(|name| name == pattern) {
        return Ok(pattern.to_string());
    }

    let matches: Vec<String> = names
        .iter()
        .filter(|name| name.contains(pattern))
        .cloned()
        .collect();

    match matches.as_slice() {
        [only] => Ok(only.clone()),
        [] => Err(DockerError::NoMatch {
            pattern: pattern.to_string(),
            available: names.to_vec(),
        }),
        _ => Err(DockerError::Ambiguous {
            pattern: pattern.to_string(),
            matches,
        }),
    }
}

/// Restarts containers through the Docker CLI.
#[derive(Debug, Clone)]
pub struct DockerRestarter {
    config: DockerConfig,
}

impl DockerRestarter {
    /// Creates a restarter for `config`.
    #[must_use]
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    /// The configuration this restarter was built with.
    #[must_use]
    pub fn config(&self) -> &DockerConfig {
        &self.config
    }

    /// Returns true if the docker CLI can be found.
    #[must_use]
    pub fn cli_available(&self) -> bool {
        locate_program(&self.config.program).is_some()
    }

    /// Runs docker with `args`, enforcing the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::Spawn` if docker cannot be started and
    /// `DockerError::Timeout` if it does not finish in time. A non-zero exit
    /// is not an error here; check [`CommandOutput::success`].
    #[instrument(skip(self), fields(timeout_ms = %self.config.command_timeout.as_millis()))]
    pub async fn execute(&self, args: &[&str]) -> Result<CommandOutput, DockerError> {
        let command_line = self.command_line(args);

        let child = Command::new(&self.config.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DockerError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        // On timeout the future owning the child is dropped, and kill_on_drop reaps it.
        let output = tokio::time::timeout(self.config.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| DockerError::Timeout {
                command: command_line.clone(),
                timeout: self.config.command_timeout,
            })?
            .map_err(|source| DockerError::Spawn {
                command: command_line,
                source,
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        debug!(exit_code = result.exit_code, "docker finished");
        Ok(result)
    }

    /// Like [`execute`](Self::execute), but a non-zero exit becomes
    /// `DockerError::CommandFailed`.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute), plus `DockerError::CommandFailed`.
    pub async fn run_checked(&self, args: &[&str]) -> Result<CommandOutput, DockerError> {
        let output = self.execute(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(DockerError::CommandFailed {
                command: self.command_line(args),
                status: format!("exit code {}", output.exit_code),
                output: output.combined(),
            })
        }
    }

    /// Names of the running containers.
    ///
    /// # Errors
    ///
    /// Returns an error if `docker ps` fails.
    pub async fn list_running(&self) -> Result<Vec<String>, DockerError> {
        let output = self.run_checked(&["ps", "--format", "{{.Names}}"]).await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Resolves `pattern` against the running containers.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails or the pattern does not pick
    /// exactly one container.
    pub async fn resolve(&self, pattern: &str) -> Result<String, DockerError> {
        let names = self.list_running().await?;
        let resolved = resolve_container_name(pattern, &names)?;
        if resolved == pattern {
            info!("Found Docker container with exact name '{resolved}'");
        } else {
            info!("Found single Docker container containing '{pattern}': '{resolved}'");
        }
        Ok(resolved)
    }

    /// Resolves and restarts the container, returning its resolved name.
    ///
    /// # Errors
    ///
    /// Returns an error if the CLI is missing, resolution fails, or
    /// `docker restart` fails.
    pub async fn try_restart(&self, pattern: &str) -> Result<String, DockerError> {
        if !self.cli_available() {
            return Err(DockerError::CliMissing {
                program: self.config.program.clone(),
            });
        }

        let name = self.resolve(pattern).await?;
        let output = self.run_checked(&["restart", &name]).await?;
        info!(
            "Restarted Docker container '{name}' (pattern '{pattern}'). Output:\n{}",
            output.combined()
        );
        Ok(name)
    }

    /// Restarts the container matching `pattern`, logging any failure.
    /// Returns the restarted container's name.
    #[instrument(skip(self))]
    pub async fn restart(&self, pattern: &str) -> Option<String> {
        match self.try_restart(pattern).await {
            Ok(name) => Some(name),
            Err(e @ DockerError::CliMissing { .. }) => {
                warn!("{e}; cannot restart a Docker container");
                None
            }
            Err(e) => {
                error!("Docker restart failed: {e}");
                None
            }
        }
    }

    fn command_line(&self, args: &[&str]) -> String {
        std::iter::once(self.config.program.as_str())
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
