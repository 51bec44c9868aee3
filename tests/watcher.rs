//! Integration tests for the watch loop.
//!
//! These tests verify:
//! - Matching lines trigger the restart handler
//! - Bursts within the cooldown window trigger once
//! - Shutdown stops the loop and the kernel log reader
//! - A reader that exits on its own ends the loop with its status

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use usb_printer_watcher::config::{KernelLogConfig, WatcherConfig};
use usb_printer_watcher::error::KernelLogError;
use usb_printer_watcher::monitor::{Cooldown, EventMatcher, KernelLog, LineSource};
use usb_printer_watcher::restart::{RestartHandler, RestartOutcome};
use usb_printer_watcher::watcher::{LineVerdict, WatchEnd, Watcher};

const PLUG_BURST: [&str; 3] = [
    "[Oct16 09:16] usb 1-1.2: new high-speed USB device number 5 using xhci_hcd",
    concat!(
        "[Oct16 09:16] usblp 1-1.2:1.0: usblp0: USB Bidirectional printer dev 5 if 0 alt 0 ",
        "proto 2 vid 0x04F9 pid 0x0042"
    ),
    "[Oct16 09:16] usbcore: registered new interface driver usblp",
];

/// Counts restart requests and answers with a fixed outcome, optionally
/// after a delay.
#[derive(Clone)]
struct RecordingHandler {
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    outcome: RestartOutcome,
    delay: Duration,
}

impl RecordingHandler {
    fn new(outcome: RestartOutcome) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
            outcome,
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RestartHandler for RecordingHandler {
    async fn handle_printer_event(&self) -> RestartOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Serves canned lines, then either ends or blocks forever.
struct CannedSource {
    lines: VecDeque<String>,
    block_when_empty: bool,
    shut_down: Arc<AtomicUsize>,
}

impl CannedSource {
    fn new(lines: &[&str], block_when_empty: bool) -> Self {
        Self {
            lines: lines.iter().map(|l| (*l).to_string()).collect(),
            block_when_empty,
            shut_down: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl LineSource for CannedSource {
    async fn next_line(&mut self) -> Result<Option<String>, KernelLogError> {
        match self.lines.pop_front() {
            Some(line) => Ok(Some(line)),
            None if self.block_when_empty => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn shutdown(&mut self) -> String {
        self.shut_down.fetch_add(1, Ordering::SeqCst);
        "exit status: 0".to_string()
    }
}

fn docker_ok() -> RestartOutcome {
    RestartOutcome::DockerContainer("p910nd".to_string())
}

fn watcher(cooldown: Duration, handler: RecordingHandler) -> Watcher<RecordingHandler> {
    Watcher::new(
        EventMatcher::new(["usblp", "USB Bidirectional printer"]),
        Cooldown::new(cooldown),
        handler,
    )
}

// =============================================================================
// Line processing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_triggers_once() {
    let handler = RecordingHandler::new(docker_ok());
    let mut watcher = watcher(Duration::from_secs(10), handler.clone());

    assert_eq!(watcher.process_line(PLUG_BURST[0]).await, LineVerdict::Ignored);
    assert_eq!(
        watcher.process_line(PLUG_BURST[1]).await,
        LineVerdict::Triggered(docker_ok())
    );
    assert_eq!(watcher.process_line(PLUG_BURST[2]).await, LineVerdict::Suppressed);

    assert_eq!(handler.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_again_after_cooldown() {
    let handler = RecordingHandler::new(docker_ok());
    let mut watcher = watcher(Duration::from_secs(10), handler.clone());

    assert!(matches!(
        watcher.process_line(PLUG_BURST[1]).await,
        LineVerdict::Triggered(_)
    ));

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(watcher.process_line(PLUG_BURST[2]).await, LineVerdict::Suppressed);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(matches!(
        watcher.process_line(PLUG_BURST[2]).await,
        LineVerdict::Triggered(_)
    ));

    assert_eq!(handler.calls(), 2);
}

#[tokio::test]
async fn test_empty_and_whitespace_lines_are_ignored() {
    let handler = RecordingHandler::new(docker_ok());
    let mut watcher = watcher(Duration::ZERO, handler.clone());

    assert_eq!(watcher.process_line("").await, LineVerdict::Ignored);
    assert_eq!(watcher.process_line("   \t").await, LineVerdict::Ignored);
    assert_eq!(watcher.summary(WatchEnd::Shutdown).lines_seen, 0);
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_failed_restarts_are_counted() {
    let handler = RecordingHandler::new(RestartOutcome::Failed);
    let mut watcher = watcher(Duration::from_secs(10), handler.clone());

    assert_eq!(
        watcher.process_line(PLUG_BURST[1]).await,
        LineVerdict::Triggered(RestartOutcome::Failed)
    );

    let summary = watcher.summary(WatchEnd::Shutdown);
    assert_eq!(summary.triggers, 1);
    assert_eq!(summary.failures, 1);
}

#[tokio::test]
async fn test_from_config_uses_configured_tokens() {
    let config = WatcherConfig::default()
        .with_match_tokens(["lp0"])
        .with_cooldown(Duration::from_secs(1));
    let handler = RecordingHandler::new(docker_ok());
    let mut watcher = Watcher::from_config(&config, handler.clone());

    assert_eq!(watcher.process_line(PLUG_BURST[2]).await, LineVerdict::Ignored);
    assert!(matches!(
        watcher.process_line("usblp0: removed").await,
        LineVerdict::Triggered(_)
    ));
}

// =============================================================================
// Run loop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_run_until_source_ends() {
    let handler = RecordingHandler::new(docker_ok());
    let mut watcher = watcher(Duration::from_secs(10), handler.clone());
    let mut source = CannedSource::new(&PLUG_BURST, false);
    let shut_down = Arc::clone(&source.shut_down);

    let summary = watcher
        .run(&mut source, std::future::pending())
        .await
        .expect("run failed");

    assert_eq!(summary.lines_seen, 3);
    assert_eq!(summary.triggers, 1);
    assert_eq!(summary.suppressed, 1);
    assert_eq!(summary.failures, 0);
    assert_eq!(
        summary.end,
        WatchEnd::SourceEnded {
            status: "exit status: 0".to_string()
        }
    );
    assert_eq!(shut_down.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let handler = RecordingHandler::new(docker_ok());
    let mut watcher = watcher(Duration::from_secs(10), handler.clone());
    let mut source = CannedSource::new(&[PLUG_BURST[1]], true);
    let shut_down = Arc::clone(&source.shut_down);

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async move {
        let _ = rx.await;
    };

    let run = tokio::spawn(async move {
        let summary = watcher.run(&mut source, shutdown).await;
        (summary, source)
    });

    // Give the loop time to consume the canned line and block.
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(()).expect("watcher dropped the shutdown receiver");

    let (summary, _source) = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("watcher did not stop")
        .expect("watcher task panicked");
    let summary = summary.expect("run failed");

    assert_eq!(summary.end, WatchEnd::Shutdown);
    assert_eq!(summary.triggers, 1);
    assert_eq!(handler.calls(), 1);
    assert_eq!(shut_down.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_restart_abandons_it() {
    let handler = RecordingHandler::new(docker_ok()).with_delay(Duration::from_secs(180));
    let mut watcher = watcher(Duration::from_secs(10), handler.clone());
    let mut source = CannedSource::new(&[PLUG_BURST[1]], true);
    let shut_down = Arc::clone(&source.shut_down);

    let started = Instant::now();
    let summary = watcher
        .run(&mut source, tokio::time::sleep(Duration::from_millis(100)))
        .await
        .expect("run failed");

    assert!(
        started.elapsed() < Duration::from_secs(1),
        "run returned after {:?}",
        started.elapsed()
    );
    assert_eq!(summary.end, WatchEnd::Shutdown);
    assert_eq!(summary.triggers, 1);
    assert_eq!(handler.calls(), 1);
    assert_eq!(handler.completed(), 0);
    assert_eq!(shut_down.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_with_real_reader_process() {
    let script = PLUG_BURST
        .iter()
        .map(|line| format!("echo '{line}'"))
        .collect::<Vec<_>>()
        .join("; ");
    let config = KernelLogConfig::default()
        .with_command("sh", ["-c", script.as_str()])
        .with_shutdown_grace(Duration::from_secs(1));

    let handler = RecordingHandler::new(docker_ok());
    let mut watcher = watcher(Duration::from_secs(10), handler.clone());
    let mut source = KernelLog::spawn(&config).expect("failed to spawn reader");

    let summary = watcher
        .run(&mut source, std::future::pending())
        .await
        .expect("run failed");

    assert_eq!(summary.lines_seen, 3);
    assert_eq!(handler.calls(), 1);
    assert!(matches!(summary.end, WatchEnd::SourceEnded { .. }));
}
