//! Desktop session facts that shape the unit name and error reporting.

use std::env;
use std::io::{self, IsTerminal};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};

/// Desktop entry ID exported by launchers such as fuzzel.
pub(crate) const DESKTOP_FILE_ID_ENV: &str = "FUZZEL_DESKTOP_FILE_ID";
/// Colon-separated list of desktop environment names.
pub(crate) const CURRENT_DESKTOP_ENV: &str = "XDG_CURRENT_DESKTOP";

const DESKTOP_SUFFIX: &str = ".desktop";

/// Process environment the launcher consults, captured once so tests can
/// substitute it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LaunchEnvironment {
    pub(crate) desktop_file_id: Option<String>,
    pub(crate) current_desktop: Option<String>,
    /// `None` when the current directory is unavailable or not UTF-8.
    pub(crate) working_dir: Option<Utf8PathBuf>,
    pub(crate) stdin_is_terminal: bool,
}

impl LaunchEnvironment {
    /// Reads the environment of the running process.
    pub(crate) fn capture() -> Self {
        Self {
            desktop_file_id: env::var(DESKTOP_FILE_ID_ENV).ok(),
            current_desktop: env::var(CURRENT_DESKTOP_ENV).ok(),
            working_dir: env::current_dir()
                .ok()
                .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok()),
            stdin_is_terminal: io::stdin().is_terminal(),
        }
    }

    /// Returns the desktop entry name when the launcher was started from a
    /// `.desktop` file.
    pub(crate) fn desktop_entry(&self) -> Option<&str> {
        self.desktop_file_id
            .as_deref()
            .and_then(|id| id.strip_suffix(DESKTOP_SUFFIX))
            .filter(|entry| !entry.is_empty())
    }

    /// Names the application: its desktop entry, else the command's file
    /// name.
    pub(crate) fn app_name(&self, executable: &str) -> String {
        if let Some(entry) = self.desktop_entry() {
            return entry.to_owned();
        }
        Path::new(executable)
            .file_name()
            .map_or_else(|| executable.to_owned(), |name| name.to_string_lossy().into_owned())
    }

    /// Returns the first desktop environment name, if any is set.
    pub(crate) fn desktop_name(&self) -> Option<&str> {
        self.current_desktop
            .as_deref()
            .map(|desktops| desktops.split(':').next().unwrap_or(desktops))
    }

    /// Resolves the unit's working directory against the current one.
    pub(crate) fn resolve_working_dir(&self, requested: Option<&Utf8Path>) -> Option<Utf8PathBuf> {
        match requested {
            Some(dir) if dir.is_absolute() => Some(dir.to_owned()),
            Some(dir) => self.working_dir.as_ref().map(|cwd| cwd.join(dir)),
            None => self.working_dir.clone(),
        }
    }
}
