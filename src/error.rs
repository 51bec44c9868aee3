//! Error types for the USB printer watcher.
//!
//! Uses thiserror for deriving std::error::Error and miette for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the application.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration")]
    #[diagnostic(code(upw::config))]
    Config(#[from] ConfigError),

    /// Host is missing something the watcher cannot run without
    #[error("Preflight check failed")]
    #[diagnostic(code(upw::preflight))]
    Preflight(#[from] PreflightError),

    /// Kernel log reader failure
    #[error("Kernel log error")]
    #[diagnostic(code(upw::kernel_log))]
    KernelLog(#[from] KernelLogError),

    /// TrueNAS API failure
    #[error("TrueNAS API error")]
    #[diagnostic(code(upw::truenas))]
    TrueNas(#[from] TrueNasError),

    /// Docker CLI failure
    #[error("Docker error")]
    #[diagnostic(code(upw::docker))]
    Docker(#[from] DockerError),

    /// I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(upw::io))]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading configuration from the environment.
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    /// Cooldown is not a usable number of seconds
    #[error("Invalid COOLDOWN_SECONDS value '{value}'")]
    #[diagnostic(
        code(upw::config::cooldown),
        help("Use a non-negative number of seconds, e.g. COOLDOWN_SECONDS=10 or 2.5")
    )]
    InvalidCooldown { value: String },

    /// Docker timeout is not a usable number of seconds
    #[error("Invalid DOCKER_TIMEOUT_SECONDS value '{value}'")]
    #[diagnostic(
        code(upw::config::docker_timeout),
        help("Use a positive number of seconds, e.g. DOCKER_TIMEOUT_SECONDS=60")
    )]
    InvalidTimeout { value: String },

    /// Unknown log level name
    #[error("Unknown LOG_LEVEL '{value}'")]
    #[diagnostic(
        code(upw::config::log_level),
        help("Valid levels: DEBUG, INFO, WARNING, ERROR, CRITICAL")
    )]
    InvalidLogLevel { value: String },
}

/// Errors related to host preflight checks.
#[derive(Error, Debug, Diagnostic)]
pub enum PreflightError {
    /// Kernel log reader binary not on PATH
    #[error("Kernel log reader '{program}' not found on PATH")]
    #[diagnostic(
        code(upw::preflight::kernel_log_reader),
        help("Install util-linux (provides dmesg) in the image, or point DMESG_BIN at it")
    )]
    KernelLogReaderMissing { program: String },
}

/// Errors from the kernel log reader process.
#[derive(Error, Debug, Diagnostic)]
pub enum KernelLogError {
    /// Failed to spawn the reader
    #[error("Failed to start '{program}'")]
    #[diagnostic(
        code(upw::kernel_log::spawn),
        help("The container needs access to /dev/kmsg (privileged or CAP_SYSLOG)")
    )]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reader did not expose a stdout pipe
    #[error("Kernel log reader has no stdout pipe")]
    #[diagnostic(code(upw::kernel_log::pipe))]
    MissingPipe,

    /// Failed reading a line from the reader
    #[error("Failed to read kernel log output")]
    #[diagnostic(code(upw::kernel_log::read))]
    Read(#[source] std::io::Error),

    /// Reader exited while we were still following it
    #[error("Kernel log reader exited unexpectedly ({status})")]
    #[diagnostic(
        code(upw::kernel_log::exited),
        help("Check the warnings above for the reader's stderr; dmesg --follow needs CAP_SYSLOG")
    )]
    Exited { status: String },
}

/// Errors from the TrueNAS REST API.
#[derive(Error, Debug, Diagnostic)]
pub enum TrueNasError {
    /// BASE_URL or API_KEY missing
    #[error("TrueNAS API is not configured")]
    #[diagnostic(
        code(upw::truenas::not_configured),
        help("Set both BASE_URL and API_KEY to use the TrueNAS app restart path")
    )]
    NotConfigured,

    /// HTTP client could not be built
    #[error("Failed to build HTTP client")]
    #[diagnostic(code(upw::truenas::client))]
    Client(#[source] reqwest::Error),

    /// Transport-level failure
    #[error("Request to {url} failed")]
    #[diagnostic(code(upw::truenas::request))]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success status
    #[error("{url} returned HTTP {status}: {body}")]
    #[diagnostic(code(upw::truenas::status))]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Response body was not what we expected
    #[error("Unexpected response from {url}")]
    #[diagnostic(code(upw::truenas::decode))]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors from the Docker CLI.
#[derive(Error, Debug, Diagnostic)]
pub enum DockerError {
    /// docker binary not on PATH
    #[error("Docker CLI '{program}' not found on PATH")]
    #[diagnostic(
        code(upw::docker::missing_cli),
        help("Install docker-ce-cli in the image and mount /var/run/docker.sock")
    )]
    CliMissing { program: String },

    /// Failed to spawn docker
    #[error("Failed to run '{command}'")]
    #[diagnostic(code(upw::docker::spawn))]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// docker exited with a non-zero status
    #[error("'{command}' failed ({status}): {output}")]
    #[diagnostic(code(upw::docker::command_failed))]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    /// docker did not finish in time
    #[error("'{command}' did not finish within {timeout:?}")]
    #[diagnostic(code(upw::docker::timeout))]
    Timeout { command: String, timeout: Duration },

    /// No containers running at all
    #[error("No running Docker containers")]
    #[diagnostic(code(upw::docker::none_running))]
    NoRunningContainers,

    /// Pattern matched nothing
    #[error("No container name contains '{pattern}'; running containers: {available:?}")]
    #[diagnostic(code(upw::docker::no_match))]
    NoMatch {
        pattern: String,
        available: Vec<String>,
    },

    /// Pattern matched more than one container
    #[error("Multiple containers contain '{pattern}': {matches:?}")]
    #[diagnostic(
        code(upw::docker::ambiguous),
        help("Make DOCKER_CONTAINER more specific (the exact container name always wins)")
    )]
    Ambiguous {
        pattern: String,
        matches: Vec<String>,
    },
}

/// Errors while installing log outputs.
#[derive(Error, Debug, Diagnostic)]
pub enum LoggingError {
    /// Log file could not be opened
    #[error("Cannot open log file {}", path.display())]
    #[diagnostic(code(upw::logging::file))]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Syslog socket unreachable
    #[error("Cannot connect to syslog at {}", address.display())]
    #[diagnostic(code(upw::logging::syslog))]
    Syslog {
        address: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
