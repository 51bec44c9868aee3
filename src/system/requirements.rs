//! Preflight checking implementation.

use std::env;
use std::path::{Path, PathBuf};

use nix::unistd::{AccessFlags, access};

use crate::config::WatcherConfig;
use crate::error::PreflightError;

/// Kernel message device read by `dmesg`.
pub const KMSG_PATH: &str = "/dev/kmsg";

/// Results of all preflight checks.
#[derive(Debug, Clone)]
pub struct Preflight {
    /// Resolved path of the kernel log reader
    pub kernel_log_reader: PathBuf,
    /// Resolved path of the Docker CLI, if installed
    pub docker_cli: Option<PathBuf>,
    /// Whether `/dev/kmsg` is readable by this process
    pub kmsg_readable: bool,
}

impl Preflight {
    /// Returns true if the Docker fallback can be used.
    #[must_use]
    pub fn docker_available(&self) -> bool {
        self.docker_cli.is_some()
    }
}

/// Run all preflight checks for `config`.
///
/// Only a missing kernel log reader is fatal. The Docker CLI and `/dev/kmsg`
/// are reported so the caller can warn about them.
///
/// # Errors
///
/// Returns `PreflightError::KernelLogReaderMissing` if the reader is not found.
pub fn check_all(config: &WatcherConfig) -> Result<Preflight, PreflightError> {
    let kernel_log_reader = check_kernel_log_reader(&config.kernel_log.program)?;
    let docker_cli = check_docker_cli(&config.docker.program);
    let kmsg_readable = check_kmsg_readable(Path::new(KMSG_PATH));

    Ok(Preflight {
        kernel_log_reader,
        docker_cli,
        kmsg_readable,
    })
}

/// Check the kernel log reader is installed.
///
/// # Errors
///
/// Returns error if `program` cannot be found.
pub fn check_kernel_log_reader(program: &str) -> Result<PathBuf, PreflightError> {
    locate_program(program).ok_or_else(|| PreflightError::KernelLogReaderMissing {
        program: program.to_string(),
    })
}

/// Locate the Docker CLI, if installed.
#[must_use]
pub fn check_docker_cli(program: &str) -> Option<PathBuf> {
    locate_program(program)
}

/// Check whether `path` can be opened for reading.
#[must_use]
pub fn check_kmsg_readable(path: &Path) -> bool {
    access(path, AccessFlags::R_OK).is_ok()
}

/// Resolves a program name the way a shell would.
///
/// A name containing `/` is checked as given. Otherwise each `PATH`
/// directory is searched for an executable file of that name.
#[must_use]
pub fn locate_program(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }

    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}
