//! USB Printer Watcher - restarts the print server when a USB printer reappears.
//!
//! This crate follows the kernel log and, whenever a USB printer is attached
//! or re-enumerated, restarts the print server (`p910nd` by default) so it
//! opens the new device node. The restart goes through the TrueNAS SCALE app
//! API when available and falls back to `docker restart`.
//!
//! # Platform Requirements
//!
//! - Linux with `dmesg --follow` (util-linux)
//! - Read access to `/dev/kmsg` (privileged container or `CAP_SYSLOG`)
//! - For the Docker path: the Docker CLI and the host's `docker.sock`
//!
//! # Example
//!
//! ```no_run
//! use usb_printer_watcher::config::WatcherConfig;
//! use usb_printer_watcher::monitor::KernelLog;
//! use usb_printer_watcher::restart::RestartCoordinator;
//! use usb_printer_watcher::watcher::Watcher;
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let config = WatcherConfig::from_env()?;
//!     let coordinator = RestartCoordinator::from_config(&config)?;
//!     let mut source = KernelLog::spawn(&config.kernel_log)?;
//!
//!     let mut watcher = Watcher::from_config(&config, coordinator);
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     watcher.run(&mut source, shutdown).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod restart;
pub mod system;
pub mod watcher;

// Re-export commonly used types
pub use config::WatcherConfig;
pub use error::{Error, Result};
pub use restart::{RestartCoordinator, RestartHandler, RestartOutcome};
pub use watcher::{WatchEnd, WatchSummary, Watcher};
