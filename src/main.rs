//! USB Printer Watcher - Entry Point
//!
//! Runs as the container entrypoint with no arguments; everything is
//! configured through environment variables.

use clap::Parser;
use miette::Result;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{Level, error, info, warn};

use usb_printer_watcher::config::{WatcherConfig, redact};
use usb_printer_watcher::error::KernelLogError;
use usb_printer_watcher::monitor::KernelLog;
use usb_printer_watcher::restart::{RestartCoordinator, RestartHandler};
use usb_printer_watcher::watcher::{WatchEnd, Watcher};
use usb_printer_watcher::{logging, system};

/// USB Printer Watcher - restart the print server on USB printer events.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Skip preflight checks for dmesg and docker
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Enable verbose logging (overrides LOG_LEVEL and RUST_LOG)
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Run the restart procedure once and exit
    #[arg(long, default_value = "false")]
    trigger_now: bool,

    /// Log the resolved configuration and exit
    #[arg(long, default_value = "false")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = WatcherConfig::from_env()?;
    if args.verbose {
        config.logging.level = Level::DEBUG;
        config.logging.force_debug = true;
    }

    logging::init(&config.logging);

    info!("USB Printer Watcher v{}", env!("CARGO_PKG_VERSION"));
    log_config(&config);

    if args.print_config {
        return Ok(());
    }

    if args.skip_checks {
        warn!("Skipping preflight checks (--skip-checks)");
    } else {
        info!("Running preflight checks...");
        let preflight = system::check_all(&config).inspect_err(|_| {
            error!("Preflight checks failed");
        })?;

        info!(
            "Kernel log reader: {}",
            preflight.kernel_log_reader.display()
        );
        match &preflight.docker_cli {
            Some(path) => info!("Docker CLI: {}", path.display()),
            None => warn!(
                "Docker CLI '{}' not found; only the TrueNAS API path can restart the print server",
                config.docker.program
            ),
        }
        if !preflight.kmsg_readable {
            warn!(
                "{} is not readable; dmesg --follow may fail without CAP_SYSLOG",
                system::KMSG_PATH
            );
        }
        if !config.truenas.is_configured() && !preflight.docker_available() {
            warn!("Neither the TrueNAS API nor the Docker CLI is available; restarts will fail");
        }
    }

    let coordinator = RestartCoordinator::from_config(&config)?;

    if args.trigger_now {
        let outcome = coordinator.handle_printer_event().await;
        info!("Manual trigger: {outcome}");
        if !outcome.succeeded() {
            miette::bail!("manual restart failed");
        }
        return Ok(());
    }

    let mut source = KernelLog::spawn(&config.kernel_log)?;
    let mut watcher = Watcher::from_config(&config, coordinator);

    let summary = watcher.run(&mut source, shutdown_signal()).await?;

    match summary.end {
        WatchEnd::Shutdown => Ok(()),
        WatchEnd::SourceEnded { status } => Err(KernelLogError::Exited { status }.into()),
    }
}

fn log_config(config: &WatcherConfig) {
    info!(
        base_url = %config.truenas.base_url,
        api_key = redact(&config.truenas.api_key),
        app_name = %config.truenas.app_name,
        verify_tls = config.truenas.verify_tls,
        docker_container = %config.docker.container_pattern,
        "Restart targets"
    );
    info!(
        tokens = ?config.match_tokens,
        cooldown_secs = config.cooldown.as_secs_f64(),
        reader = %config.kernel_log.program,
        "Event matching"
    );
    info!(
        level = %config.logging.level,
        verbose = config.logging.force_debug,
        to_file = config.logging.to_file,
        file_path = %config.logging.file_path.display(),
        to_syslog = config.logging.to_syslog,
        syslog_address = %config.logging.syslog_address.display(),
        "Logging"
    );
}

/// Resolves on SIGINT or SIGTERM (`docker stop` sends the latter).
async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {e}");
            None
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = async {
            match terminate.as_mut() {
                Some(stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        } => {}
    }
}
