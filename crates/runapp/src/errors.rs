//! Error types for the launcher runtime.

use std::sync::Arc;

use runapp_bus::ConnectError;
use thiserror::Error;

use crate::launch::LaunchError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to determine the working directory")]
    WorkingDirectory,
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

impl AppError {
    /// Returns `true` once the failure concerns the launched command rather
    /// than the launcher's own setup.
    pub(crate) const fn is_launch_failure(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Launch(_))
    }
}
