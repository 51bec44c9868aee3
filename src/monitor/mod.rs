//! Kernel log monitoring.
//!
//! The watcher follows the kernel ring buffer through an external reader
//! (`dmesg --follow --human` by default) and looks for lines that mention a
//! USB printer. A burst of matching lines from one plug event is collapsed
//! by a cooldown window.
//!
//! # Example
//!
//! ```
//! use usb_printer_watcher::monitor::{Cooldown, EventMatcher};
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let matcher = EventMatcher::new(["usblp"]);
//! assert!(matcher.matches("usblp 1-1:1.0: usblp0: USB Bidirectional printer dev 4"));
//!
//! let mut cooldown = Cooldown::new(Duration::from_secs(10));
//! let now = Instant::now();
//! assert!(cooldown.try_trigger(now));
//! assert!(!cooldown.try_trigger(now));
//! ```

mod cooldown;
mod kernel_log;
mod matcher;

pub use cooldown::Cooldown;
pub use kernel_log::{KernelLog, LineSource};
pub use matcher::EventMatcher;
