//! Kernel log reader process.
//!
//! `dmesg --follow` never exits on its own, so the reader is owned by the
//! watcher and torn down explicitly: SIGTERM first, SIGKILL after a grace
//! period. Stdout is consumed line by line. Stderr is drained concurrently
//! (a full stderr pipe would otherwise stall the reader) and surfaced as
//! warnings, which is where permission problems on `/dev/kmsg` show up.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use crate::config::KernelLogConfig;
use crate::error::KernelLogError;

/// A source of kernel log lines.
///
/// Implemented by [`KernelLog`]; tests substitute canned sources.
#[async_trait]
pub trait LineSource: Send {
    /// Returns the next non-empty, trimmed line, or `None` when the source is exhausted.
    async fn next_line(&mut self) -> Result<Option<String>, KernelLogError>;

    /// Stops the source and returns a description of how it ended.
    async fn shutdown(&mut self) -> String;
}

/// A running `dmesg --follow` (or equivalent) process.
pub struct KernelLog {
    program: String,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_drain: Option<JoinHandle<()>>,
    grace: Duration,
}

impl KernelLog {
    /// Spawns the reader described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `KernelLogError::Spawn` if the process cannot be started.
    #[instrument(skip(config), fields(program = %config.program))]
    pub fn spawn(config: &KernelLogConfig) -> Result<Self, KernelLogError> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| KernelLogError::Spawn {
                program: config.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(KernelLogError::MissingPipe)?;

        let stderr_drain = child.stderr.take().map(|stderr| {
            let program = config.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim();
                    if !line.is_empty() {
                        warn!("{program}: {line}");
                    }
                }
            })
        });

        debug!(pid = ?child.id(), args = ?config.args, "Kernel log reader started");

        Ok(Self {
            program: config.program.clone(),
            child,
            lines: BufReader::new(stdout).lines(),
            stderr_drain,
            grace: config.shutdown_grace,
        })
    }

    /// Returns the reader's process id, if it is still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self) -> std::io::Result<std::process::ExitStatus> {
        if let Ok(Some(status)) = self.child.try_wait() {
            return Ok(status);
        }

        if let Some(pid) = self.child.id().and_then(|id| i32::try_from(id).ok()) {
            trace!(pid, "Sending SIGTERM to kernel log reader");
            if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                debug!(pid, error = %e, "SIGTERM failed");
            }
        }

        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    grace_ms = %self.grace.as_millis(),
                    "{} ignored SIGTERM, killing it", self.program
                );
                self.child.kill().await?;
                self.child.wait().await
            }
        }
    }
}

#[async_trait]
impl LineSource for KernelLog {
    async fn next_line(&mut self) -> Result<Option<String>, KernelLogError> {
        loop {
            match self.lines.next_line().await.map_err(KernelLogError::Read)? {
                Some(raw) => {
                    let line = raw.trim();
                    if !line.is_empty() {
                        return Ok(Some(line.to_string()));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    async fn shutdown(&mut self) -> String {
        let status = match self.terminate().await {
            Ok(status) => status.to_string(),
            Err(e) => format!("failed to reap {}: {e}", self.program),
        };

        if let Some(drain) = self.stderr_drain.take() {
            let _ = drain.await;
        }

        debug!(%status, "Kernel log reader stopped");
        status
    }
}

impl std::fmt::Debug for KernelLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelLog")
            .field("program", &self.program)
            .field("pid", &self.child.id())
            .field("grace", &self.grace)
            .finish()
    }
}
