//! Host preflight checks.
//!
//! This module verifies that the tools the watcher shells out to are present
//! before it starts following the kernel log.

mod requirements;

pub use requirements::{
    KMSG_PATH, Preflight, check_all, check_docker_cli, check_kernel_log_reader,
    check_kmsg_readable, locate_program,
};
