//! Watcher configuration.
//!
//! Everything is read from environment variables so the container can be
//! started with no arguments. [`WatcherConfig::from_lookup`] takes the
//! variable source as a closure, which keeps tests independent of the
//! process environment.

use std::path::PathBuf;
use std::time::Duration;

use tracing::Level;

use crate::error::ConfigError;

/// Tokens matched against kernel log lines when `USB_EVENT_MATCH_ANY_OF` is unset.
///
/// `usblp` is logged by the kernel driver for any USB printer.
pub const DEFAULT_MATCH_TOKENS: &str = "usblp,USB Bidirectional printer";

/// Default name of the print server workload.
pub const DEFAULT_WORKLOAD: &str = "p910nd";

/// Default cooldown between restarts.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// Default log file location inside the container.
pub const DEFAULT_LOG_FILE: &str = "/var/log/usb-printer-watcher.log";

/// Default syslog datagram socket.
pub const DEFAULT_SYSLOG_ADDRESS: &str = "/dev/log";

/// Complete watcher configuration.
///
/// # Example
///
/// ```
/// use usb_printer_watcher::config::WatcherConfig;
/// use std::time::Duration;
///
/// let config = WatcherConfig::default()
///     .with_match_tokens(["usblp"])
///     .with_cooldown(Duration::from_secs(30));
/// assert_eq!(config.match_tokens, vec!["usblp".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// TrueNAS SCALE app restart path.
    pub truenas: TrueNasConfig,
    /// Docker container restart path.
    pub docker: DockerConfig,
    /// Kernel log reader process.
    pub kernel_log: KernelLogConfig,
    /// A line matches if it contains any of these.
    pub match_tokens: Vec<String>,
    /// Matches closer together than this trigger only once.
    pub cooldown: Duration,
    /// Log outputs.
    pub logging: LoggingConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            truenas: TrueNasConfig::default(),
            docker: DockerConfig::default(),
            kernel_log: KernelLogConfig::default(),
            match_tokens: parse_match_tokens(DEFAULT_MATCH_TOKENS),
            cooldown: DEFAULT_COOLDOWN,
            logging: LoggingConfig::default(),
        }
    }
}

impl WatcherConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric or level variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric or level variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let truenas = TrueNasConfig {
            base_url: normalize_base_url(&get("BASE_URL", "")),
            api_key: get("API_KEY", ""),
            app_name: get("APP_NAME", DEFAULT_WORKLOAD),
            verify_tls: parse_env_bool(&get("SSL_VERIFY", "false")),
            ..TrueNasConfig::default()
        };

        let docker = DockerConfig {
            program: get("DOCKER_BIN", "docker"),
            container_pattern: get("DOCKER_CONTAINER", DEFAULT_WORKLOAD),
            command_timeout: match lookup("DOCKER_TIMEOUT_SECONDS") {
                Some(raw) => parse_timeout(&raw)?,
                None => DockerConfig::default().command_timeout,
            },
        };

        let kernel_log = KernelLogConfig {
            program: get("DMESG_BIN", "dmesg"),
            ..KernelLogConfig::default()
        };

        let mut match_tokens =
            parse_match_tokens(&get("USB_EVENT_MATCH_ANY_OF", DEFAULT_MATCH_TOKENS));
        if match_tokens.is_empty() {
            match_tokens = parse_match_tokens(DEFAULT_MATCH_TOKENS);
        }

        let cooldown = match lookup("COOLDOWN_SECONDS") {
            Some(raw) => parse_cooldown(&raw)?,
            None => DEFAULT_COOLDOWN,
        };

        let logging = LoggingConfig {
            level: parse_log_level(&get("LOG_LEVEL", "INFO"))?,
            to_file: parse_env_bool(&get("LOG_TO_FILE", "false")),
            file_path: PathBuf::from(get("LOG_FILE_PATH", DEFAULT_LOG_FILE)),
            to_syslog: parse_env_bool(&get("LOG_TO_SYSLOG", "false")),
            syslog_address: PathBuf::from(get("SYSLOG_ADDRESS", DEFAULT_SYSLOG_ADDRESS)),
            force_debug: false,
        };

        Ok(Self {
            truenas,
            docker,
            kernel_log,
            match_tokens,
            cooldown,
            logging,
        })
    }

    /// Replaces the match tokens.
    #[must_use]
    pub fn with_match_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.match_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the cooldown window.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets the TrueNAS configuration.
    #[must_use]
    pub fn with_truenas(mut self, truenas: TrueNasConfig) -> Self {
        self.truenas = truenas;
        self
    }

    /// Sets the Docker configuration.
    #[must_use]
    pub fn with_docker(mut self, docker: DockerConfig) -> Self {
        self.docker = docker;
        self
    }

    /// Sets the kernel log reader configuration.
    #[must_use]
    pub fn with_kernel_log(mut self, kernel_log: KernelLogConfig) -> Self {
        self.kernel_log = kernel_log;
        self
    }
}

/// TrueNAS SCALE API settings.
#[derive(Clone)]
pub struct TrueNasConfig {
    /// Base URL without trailing slash, e.g. `https://truenas.local`.
    pub base_url: String,
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Chart release to restart. Empty disables this path.
    pub app_name: String,
    /// Verify the server certificate.
    pub verify_tls: bool,
    /// Timeout for listing releases.
    pub list_timeout: Duration,
    /// Timeout for the restart call.
    pub restart_timeout: Duration,
}

impl Default for TrueNasConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            app_name: DEFAULT_WORKLOAD.to_string(),
            verify_tls: false,
            list_timeout: Duration::from_secs(10),
            restart_timeout: Duration::from_secs(30),
        }
    }
}

// Hand-written so the API key never ends up in logs.
impl std::fmt::Debug for TrueNasConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrueNasConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("app_name", &self.app_name)
            .field("verify_tls", &self.verify_tls)
            .field("list_timeout", &self.list_timeout)
            .field("restart_timeout", &self.restart_timeout)
            .finish()
    }
}

impl TrueNasConfig {
    /// Creates a configuration pointing at `base_url` with the given key.
    #[must_use]
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Returns true when both base URL and API key are set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }

    /// Sets the app name.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Sets both request timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, list: Duration, restart: Duration) -> Self {
        self.list_timeout = list;
        self.restart_timeout = restart;
        self
    }
}

/// Docker CLI settings.
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Docker CLI binary (name on PATH or absolute path).
    pub program: String,
    /// Exact container name or a substring of it.
    pub container_pattern: String,
    /// Upper bound for each docker invocation.
    pub command_timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            program: String::from("docker"),
            container_pattern: DEFAULT_WORKLOAD.to_string(),
            command_timeout: Duration::from_secs(60),
        }
    }
}

impl DockerConfig {
    /// Sets the docker binary.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the container pattern.
    #[must_use]
    pub fn with_container_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.container_pattern = pattern.into();
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Kernel log reader settings.
#[derive(Debug, Clone)]
pub struct KernelLogConfig {
    /// Reader binary.
    pub program: String,
    /// Arguments that make the reader follow the log.
    pub args: Vec<String>,
    /// How long to wait after SIGTERM before SIGKILL.
    pub shutdown_grace: Duration,
}

impl Default for KernelLogConfig {
    fn default() -> Self {
        Self {
            program: String::from("dmesg"),
            args: vec![String::from("--follow"), String::from("--human")],
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl KernelLogConfig {
    /// Uses `program` with `args` instead of `dmesg --follow --human`.
    #[must_use]
    pub fn with_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the grace period between SIGTERM and SIGKILL.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Log output settings.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level.
    pub level: Level,
    /// Also append to `file_path`.
    pub to_file: bool,
    /// Log file path.
    pub file_path: PathBuf,
    /// Also send to syslog.
    pub to_syslog: bool,
    /// Syslog unix datagram socket.
    pub syslog_address: PathBuf,
    /// Enable DEBUG even when `RUST_LOG` asks for less (`--verbose`).
    pub force_debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            to_file: false,
            file_path: PathBuf::from(DEFAULT_LOG_FILE),
            to_syslog: false,
            syslog_address: PathBuf::from(DEFAULT_SYSLOG_ADDRESS),
            force_debug: false,
        }
    }
}

/// Interprets an on/off environment variable.
///
/// Only `true` (any case) is on. Anything else, including `1` and `yes`, is off.
#[must_use]
pub fn parse_env_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Splits a comma-separated token list, trimming and dropping empty entries.
#[must_use]
pub fn parse_match_tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}

/// Parses a cooldown given in (possibly fractional) seconds.
///
/// # Errors
///
/// Returns `ConfigError::InvalidCooldown` for non-numeric, negative or
/// non-finite values.
pub fn parse_cooldown(value: &str) -> Result<Duration, ConfigError> {
    parse_seconds(value).ok_or_else(|| ConfigError::InvalidCooldown {
        value: value.to_string(),
    })
}

fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    match parse_seconds(value) {
        Some(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(ConfigError::InvalidTimeout {
            value: value.to_string(),
        }),
    }
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Maps a level name to a tracing level.
///
/// Accepts the names used by common logging setups: `WARNING` maps to
/// `WARN` and `CRITICAL`/`FATAL` map to `ERROR`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidLogLevel` for unknown names.
pub fn parse_log_level(value: &str) -> Result<Level, ConfigError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" | "FATAL" => Ok(Level::ERROR),
        _ => Err(ConfigError::InvalidLogLevel {
            value: value.to_string(),
        }),
    }
}

/// Strips trailing slashes so paths can be appended with `format!`.
#[must_use]
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Replaces a secret with a fixed marker, keeping only whether it was set.
#[must_use]
pub fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}
