//! Log output setup.
//!
//! Stdout is always on so `docker logs` shows everything. A log file and a
//! syslog socket can be added on top. A file or socket that cannot be opened
//! is reported and skipped; it never prevents the watcher from starting.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{Event, Level, Metadata, Subscriber, warn};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;
use crate::error::LoggingError;

/// Identifier prefixed to every syslog message.
pub const SYSLOG_IDENT: &str = "usb-printer-watcher";

/// Syslog facility `user`.
const FACILITY_USER: u8 = 1;

/// Installs the global subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `config.level`.
/// Returns the outputs that could not be opened so the caller can decide
/// how loudly to complain; they are also logged as warnings here.
pub fn init(config: &LoggingConfig) -> Vec<LoggingError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (subscriber, failures) = build_subscriber(config, rust_log.as_deref());
    subscriber.init();

    for failure in &failures {
        warn!("Log output disabled: {failure}");
    }

    failures
}

/// Level filter: `rust_log` directives if any, else `config.level`.
///
/// `config.force_debug` adds a DEBUG directive on top of either.
#[must_use]
pub fn env_filter(config: &LoggingConfig, rust_log: Option<&str>) -> EnvFilter {
    let filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .parse_lossy(rust_log.unwrap_or_default());

    if config.force_debug {
        filter.add_directive(Level::DEBUG.into())
    } else {
        filter
    }
}

/// Builds the subscriber without installing it.
///
/// Outputs that fail to open are left out and returned alongside.
pub fn build_subscriber(
    config: &LoggingConfig,
    rust_log: Option<&str>,
) -> (impl Subscriber + Send + Sync + 'static, Vec<LoggingError>) {
    let mut failures = Vec::new();

    let file_layer = if config.to_file {
        match open_log_file(&config.file_path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_target(false)
                    .with_ansi(false),
            ),
            Err(e) => {
                failures.push(e);
                None
            }
        }
    } else {
        None
    };

    let syslog_layer = if config.to_syslog {
        match SyslogWriter::connect(&config.syslog_address) {
            Ok(writer) => Some(
                fmt::layer()
                    .event_format(SyslogFormat)
                    .with_writer(writer),
            ),
            Err(e) => {
                failures.push(e);
                None
            }
        }
    } else {
        None
    };

    let stdout_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(config, rust_log))
        .with(stdout_layer)
        .with(file_layer)
        .with(syslog_layer);

    (subscriber, failures)
}

/// Event format for syslog: `LEVEL message fields`, no time or span context.
struct SyslogFormat;

impl<S, N> FormatEvent<S, N> for SyslogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        write!(writer, "{} ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Opens `path` for appending, creating parent directories as needed.
///
/// # Errors
///
/// Returns `LoggingError::File` if the directory or file cannot be created.
pub fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    let to_error = |source| LoggingError::File {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(to_error)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_error)
}

/// Maps a tracing level to a syslog severity.
#[must_use]
pub fn syslog_severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        Level::DEBUG | Level::TRACE => 7,
    }
}

/// Builds one syslog datagram from a formatted log line.
#[must_use]
pub fn syslog_frame(level: &Level, line: &str) -> Vec<u8> {
    let priority = FACILITY_USER * 8 + syslog_severity(level);
    format!("<{priority}>{SYSLOG_IDENT}: {}", line.trim_end()).into_bytes()
}

/// `MakeWriter` that sends each formatted event to a syslog socket.
#[derive(Clone)]
pub struct SyslogWriter {
    socket: Arc<UnixDatagram>,
}

impl SyslogWriter {
    /// Connects to the unix datagram socket at `address`.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::Syslog` if the socket cannot be reached.
    pub fn connect(address: &Path) -> Result<Self, LoggingError> {
        let to_error = |source| LoggingError::Syslog {
            address: address.to_path_buf(),
            source,
        };
        let socket = UnixDatagram::unbound().map_err(to_error)?;
        socket.connect(address).map_err(to_error)?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }
}

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogMessage;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogMessage::new(Arc::clone(&self.socket), Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogMessage::new(Arc::clone(&self.socket), *meta.level())
    }
}

/// Buffers one event and sends it as a single datagram when dropped.
pub struct SyslogMessage {
    socket: Arc<UnixDatagram>,
    level: Level,
    buf: Vec<u8>,
}

impl SyslogMessage {
    fn new(socket: Arc<UnixDatagram>, level: Level) -> Self {
        Self {
            socket,
            level,
            buf: Vec::new(),
        }
    }
}

impl Write for SyslogMessage {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogMessage {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buf);
        // Nowhere to report a failed log write; stdout still has the line.
        let _ = self.socket.send(&syslog_frame(&self.level, &line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_syslog_frame_priority() {
        let frame = syslog_frame(&Level::ERROR, "ERROR restart failed\n");
        assert_eq!(
            String::from_utf8(frame).unwrap(),
            "<11>usb-printer-watcher: ERROR restart failed"
        );

        let frame = syslog_frame(&Level::INFO, "INFO ok");
        assert!(String::from_utf8(frame).unwrap().starts_with("<14>"));
    }

    #[test]
    fn test_syslog_writer_sends_one_datagram_per_event() {
        let dir = TempDir::new().unwrap();
        let address = dir.path().join("log.sock");
        let server = UnixDatagram::bind(&address).unwrap();

        let writer = SyslogWriter::connect(&address).unwrap();
        {
            let mut message = writer.make_writer();
            message.write_all(b"INFO printer ").unwrap();
            message.write_all(b"event\n").unwrap();
        }

        let mut buf = [0u8; 256];
        let n = server.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"<14>usb-printer-watcher: INFO printer event");
    }

    #[test]
    fn test_syslog_connect_missing_socket() {
        let dir = TempDir::new().unwrap();
        let result = SyslogWriter::connect(&dir.path().join("missing.sock"));
        assert!(matches!(result, Err(LoggingError::Syslog { .. })));
    }

    fn syslog_server(dir: &TempDir) -> (UnixDatagram, LoggingConfig) {
        let address = dir.path().join("log.sock");
        let server = UnixDatagram::bind(&address).unwrap();
        server
            .set_read_timeout(Some(std::time::Duration::from_secs(5)))
            .unwrap();
        let config = LoggingConfig {
            to_syslog: true,
            syslog_address: address,
            ..LoggingConfig::default()
        };
        (server, config)
    }

    fn recv_frame(server: &UnixDatagram) -> String {
        let mut buf = [0u8; 512];
        let n = server.recv(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    /// Runs `emit` under a subscriber logging to a fresh file and returns
    /// what ended up in the file.
    fn file_output(config: LoggingConfig, rust_log: Option<&str>, emit: impl FnOnce()) -> String {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("watcher.log");
        let config = LoggingConfig {
            to_file: true,
            file_path: path.clone(),
            ..config
        };

        let (subscriber, failures) = build_subscriber(&config, rust_log);
        assert!(failures.is_empty());
        tracing::subscriber::with_default(subscriber, emit);

        fs::read_to_string(&path).unwrap()
    }

    #[test]
    fn test_syslog_layer_sends_level_and_message_only() {
        let dir = TempDir::new().unwrap();
        let (server, config) = syslog_server(&dir);

        let (subscriber, failures) = build_subscriber(&config, None);
        assert!(failures.is_empty());
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("restart_app", app_name = "p910nd");
            let _guard = span.enter();
            tracing::info!("Restarted TrueNAS app");
            tracing::warn!("TrueNAS API unreachable");
        });

        assert_eq!(
            recv_frame(&server),
            "<14>usb-printer-watcher: INFO Restarted TrueNAS app"
        );
        assert_eq!(
            recv_frame(&server),
            "<12>usb-printer-watcher: WARN TrueNAS API unreachable"
        );
    }

    #[test]
    fn test_unopenable_log_file_keeps_other_outputs() {
        let dir = TempDir::new().unwrap();
        let (server, config) = syslog_server(&dir);

        // A regular file where the log directory should be.
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let config = LoggingConfig {
            to_file: true,
            file_path: blocker.join("watcher.log"),
            ..config
        };

        let (subscriber, failures) = build_subscriber(&config, None);
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], LoggingError::File { .. }));

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("still logging");
        });
        assert_eq!(
            recv_frame(&server),
            "<11>usb-printer-watcher: ERROR still logging"
        );
    }

    #[test]
    fn test_level_applies_without_rust_log() {
        let output = file_output(LoggingConfig::default(), None, || {
            tracing::debug!("hidden at info");
            tracing::info!("shown at info");
        });

        assert!(output.contains("shown at info"));
        assert!(!output.contains("hidden at info"));
    }

    #[test]
    fn test_rust_log_overrides_level() {
        let config = LoggingConfig {
            level: Level::ERROR,
            ..LoggingConfig::default()
        };
        let output = file_output(config, Some("debug"), || {
            tracing::debug!("debug via RUST_LOG");
        });

        assert!(output.contains("debug via RUST_LOG"));
    }

    #[test]
    fn test_force_debug_beats_rust_log() {
        let config = LoggingConfig {
            force_debug: true,
            ..LoggingConfig::default()
        };
        let output = file_output(config, Some("warn"), || {
            tracing::debug!("debug via --verbose");
        });

        assert!(output.contains("debug via --verbose"));
    }

    #[test]
    fn test_open_log_file_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/watcher.log");

        let mut file = open_log_file(&path).unwrap();
        writeln!(file, "hello").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
