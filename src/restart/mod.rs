//! Print server restart.
//!
//! Two backends are tried in order:
//!
//! 1. The TrueNAS SCALE app API, when configured and the app exists.
//! 2. `docker restart` on the container matching the configured pattern.
//!
//! Failures are logged and reported as [`RestartOutcome::Failed`]; they never
//! stop the watcher.

mod docker;
mod truenas;

pub use docker::{CommandOutput, DockerRestarter, resolve_container_name};
pub use truenas::{ChartRelease, RELEASES_PATH, RESTART_PATH, TrueNasClient};

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::WatcherConfig;
use crate::error::TrueNasError;

/// How a restart attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Restarted through the TrueNAS API (app name).
    TrueNasApp(String),
    /// Restarted through `docker restart` (resolved container name).
    DockerContainer(String),
    /// Neither backend succeeded.
    Failed,
}

impl RestartOutcome {
    /// Returns true unless the outcome is `Failed`.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for RestartOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrueNasApp(name) => write!(f, "restarted TrueNAS app '{name}'"),
            Self::DockerContainer(name) => write!(f, "restarted Docker container '{name}'"),
            Self::Failed => write!(f, "restart failed"),
        }
    }
}

/// Something that reacts to a printer event.
#[async_trait]
pub trait RestartHandler: Send + Sync {
    /// Runs the restart procedure once.
    async fn handle_printer_event(&self) -> RestartOutcome;
}

/// Runs the TrueNAS-then-Docker restart procedure.
#[derive(Debug)]
pub struct RestartCoordinator {
    truenas: TrueNasClient,
    docker: DockerRestarter,
}

impl RestartCoordinator {
    /// Creates a coordinator from its two backends.
    #[must_use]
    pub fn new(truenas: TrueNasClient, docker: DockerRestarter) -> Self {
        Self { truenas, docker }
    }

    /// Builds both backends from the watcher configuration.
    ///
    /// # Errors
    ///
    /// Returns `TrueNasError::Client` if the HTTP client cannot be built.
    pub fn from_config(config: &WatcherConfig) -> Result<Self, TrueNasError> {
        Ok(Self::new(
            TrueNasClient::new(config.truenas.clone())?,
            DockerRestarter::new(config.docker.clone()),
        ))
    }

    /// The TrueNAS backend.
    #[must_use]
    pub fn truenas(&self) -> &TrueNasClient {
        &self.truenas
    }

    /// The Docker backend.
    #[must_use]
    pub fn docker(&self) -> &DockerRestarter {
        &self.docker
    }
}

#[async_trait]
impl RestartHandler for RestartCoordinator {
    async fn handle_printer_event(&self) -> RestartOutcome {
        info!("USB printer event detected, restarting the print server");

        let app_name = self.truenas.config().app_name.as_str();
        if !app_name.is_empty()
            && self.truenas.app_exists(app_name).await
            && self.truenas.restart_app(app_name).await
        {
            return RestartOutcome::TrueNasApp(app_name.to_string());
        }

        let pattern = self.docker.config().container_pattern.as_str();
        if let Some(name) = self.docker.restart(pattern).await {
            return RestartOutcome::DockerContainer(name);
        }

        error!("Could not restart the print server as a TrueNAS app or as a Docker container");
        RestartOutcome::Failed
    }
}
