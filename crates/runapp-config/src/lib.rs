//! Shared configuration for the `runapp` launcher.
//!
//! Configuration is layered by `ortho_config`: command-line flags override
//! `RUNAPP_*` environment variables, which override an optional
//! configuration file, which overrides built-in defaults such as
//! [`default_log_filter`]. The bus address is kept as the
//! raw D-Bus address string so that it survives every layer unchanged and
//! is parsed only when a connection is about to be opened.

mod address;
mod defaults;
mod logging;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use address::{AddressParseError, BusAddress};
pub use defaults::{
    DEFAULT_LOG_FILTER, SESSION_BUS_ENV, default_bus_address, default_log_filter,
    default_log_filter_string, default_log_format, user_bus_address,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved launcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "RUNAPP")]
pub struct Config {
    /// D-Bus address of the user bus; the session default applies when unset.
    #[serde(default)]
    pub bus_address: Option<String>,
    /// Tracing filter expression applied to the launcher's own log.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format of the launcher's own log.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_address: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Returns the configured log filter expression.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the explicitly configured bus address, if any.
    #[must_use]
    pub fn bus_address(&self) -> Option<&str> {
        self.bus_address.as_deref()
    }

    /// Resolves the bus address to dial.
    ///
    /// An explicitly configured address wins; otherwise the user bus is
    /// located from the environment.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressParseError`] when the chosen address is malformed.
    pub fn resolve_bus_address(&self) -> Result<BusAddress, AddressParseError> {
        match self.bus_address() {
            Some(address) => address.parse(),
            None => default_bus_address(),
        }
    }
}
