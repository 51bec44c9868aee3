//! The watch loop: kernel log lines in, restarts out.

use std::future::Future;

use tokio::time::Instant;
use tracing::{error, info, instrument, trace, warn};

use crate::config::WatcherConfig;
use crate::error::KernelLogError;
use crate::monitor::{Cooldown, EventMatcher, LineSource};
use crate::restart::{RestartHandler, RestartOutcome};

/// What happened to a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineVerdict {
    /// Empty or not a printer event.
    Ignored,
    /// Printer event; the restart procedure ran.
    Triggered(RestartOutcome),
    /// Printer event inside the cooldown window; skipped.
    Suppressed,
}

/// Why the watch loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEnd {
    /// Shutdown was requested.
    Shutdown,
    /// The kernel log reader exited on its own.
    SourceEnded {
        /// Exit status as reported by the reader.
        status: String,
    },
}

/// Counters for one run of the watch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSummary {
    /// Non-empty lines read.
    pub lines_seen: u64,
    /// Matches that ran the restart procedure.
    pub triggers: u64,
    /// Matches skipped because of the cooldown.
    pub suppressed: u64,
    /// Triggers whose restart failed.
    pub failures: u64,
    /// Why the loop stopped.
    pub end: WatchEnd,
}

/// Feeds kernel log lines through the matcher and cooldown into a restart handler.
pub struct Watcher<H> {
    matcher: EventMatcher,
    cooldown: Cooldown,
    handler: H,
    lines_seen: u64,
    triggers: u64,
    suppressed: u64,
    failures: u64,
}

impl<H: RestartHandler> Watcher<H> {
    /// Creates a watcher.
    #[must_use]
    pub fn new(matcher: EventMatcher, cooldown: Cooldown, handler: H) -> Self {
        Self {
            matcher,
            cooldown,
            handler,
            lines_seen: 0,
            triggers: 0,
            suppressed: 0,
            failures: 0,
        }
    }

    /// Creates a watcher using the match tokens and cooldown from `config`.
    #[must_use]
    pub fn from_config(config: &WatcherConfig, handler: H) -> Self {
        Self::new(
            EventMatcher::new(config.match_tokens.iter().cloned()),
            Cooldown::new(config.cooldown),
            handler,
        )
    }

    /// The restart handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Handles one kernel log line.
    pub async fn process_line(&mut self, line: &str) -> LineVerdict {
        let line = line.trim();
        if line.is_empty() {
            return LineVerdict::Ignored;
        }
        self.lines_seen += 1;

        if !self.matcher.matches(line) {
            trace!(line, "kernel log");
            return LineVerdict::Ignored;
        }

        if !self.cooldown.try_trigger(Instant::now()) {
            self.suppressed += 1;
            info!("Additional printer match within the cooldown window, skipping");
            return LineVerdict::Suppressed;
        }

        info!("Printer event detected in line: {line}");
        self.triggers += 1;
        let outcome = self.handler.handle_printer_event().await;
        if !outcome.succeeded() {
            self.failures += 1;
        }
        LineVerdict::Triggered(outcome)
    }

    /// Follows `source` until it ends or `shutdown` completes.
    ///
    /// `shutdown` is also watched while a restart is running; the restart is
    /// dropped when it fires. The source is always shut down before returning.
    ///
    /// # Errors
    ///
    /// Returns `KernelLogError::Read` if reading from the source fails.
    #[instrument(skip_all, fields(cooldown_ms = %self.cooldown.window().as_millis()))]
    pub async fn run<S, F>(
        &mut self,
        source: &mut S,
        shutdown: F,
    ) -> Result<WatchSummary, KernelLogError>
    where
        S: LineSource + ?Sized,
        F: Future<Output = ()>,
    {
        info!(
            "Watching kernel log for USB printer events. Patterns: {:?}",
            self.matcher.tokens()
        );

        tokio::pin!(shutdown);

        let shutdown_requested = loop {
            let next = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(true);
                }
                next = source.next_line() => next,
            };

            match next {
                Ok(Some(line)) => {
                    // A restart can take minutes; shutdown abandons it.
                    tokio::select! {
                        biased;
                        () = &mut shutdown => {
                            warn!("Shutdown requested during restart, abandoning it");
                            break Ok(true);
                        }
                        _ = self.process_line(&line) => {}
                    }
                }
                Ok(None) => break Ok(false),
                Err(e) => break Err(e),
            }
        };

        let status = source.shutdown().await;

        let end = match shutdown_requested {
            Ok(true) => WatchEnd::Shutdown,
            Ok(false) => {
                error!("Kernel log reader exited ({status})");
                WatchEnd::SourceEnded { status }
            }
            Err(e) => {
                error!("Kernel log read failed: {e}");
                return Err(e);
            }
        };

        let summary = self.summary(end);
        info!(
            lines = summary.lines_seen,
            triggers = summary.triggers,
            suppressed = summary.suppressed,
            failures = summary.failures,
            "Watcher stopped"
        );
        Ok(summary)
    }

    /// Current counters with the given end reason.
    #[must_use]
    pub fn summary(&self, end: WatchEnd) -> WatchSummary {
        WatchSummary {
            lines_seen: self.lines_seen,
            triggers: self.triggers,
            suppressed: self.suppressed,
            failures: self.failures,
            end,
        }
    }
}
