use std::env;

use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::address::{AddressParseError, BusAddress};
use crate::logging::LogFormat;

/// Environment variable consulted for the session bus address.
pub const SESSION_BUS_ENV: &str = "DBUS_SESSION_BUS_ADDRESS";

/// Default log filter expression used by the launcher.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Default log filter expression used by the launcher.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the launcher.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Resolves the user bus address from the process environment.
///
/// # Errors
///
/// Returns an [`AddressParseError`] when `DBUS_SESSION_BUS_ADDRESS` is set
/// but does not name a dialable Unix socket.
pub fn default_bus_address() -> Result<BusAddress, AddressParseError> {
    let session = env::var(SESSION_BUS_ENV).ok();
    user_bus_address(session.as_deref(), runtime_base_directory())
}

/// Chooses the user bus address from explicit inputs.
///
/// The session variable wins when present and non-empty; otherwise the bus
/// socket is expected at `<runtime dir>/bus`, falling back to
/// `/run/user/<uid>/bus` when no runtime directory is known.
///
/// # Errors
///
/// Returns an [`AddressParseError`] when `session` is set but malformed.
pub fn user_bus_address(
    session: Option<&str>,
    runtime_dir: Option<Utf8PathBuf>,
) -> Result<BusAddress, AddressParseError> {
    if let Some(address) = session.filter(|value| !value.trim().is_empty()) {
        return address.parse();
    }
    let base = runtime_dir.unwrap_or_else(fallback_runtime_directory);
    Ok(BusAddress::unix(base.join("bus")))
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(not(unix))]
const fn runtime_base_directory() -> Option<Utf8PathBuf> {
    None
}

#[cfg(unix)]
fn fallback_runtime_directory() -> Utf8PathBuf {
    let uid = unsafe { geteuid() };
    Utf8PathBuf::from(format!("/run/user/{uid}"))
}

#[cfg(not(unix))]
fn fallback_runtime_directory() -> Utf8PathBuf {
    Utf8PathBuf::from(env::temp_dir().to_string_lossy().into_owned())
}
