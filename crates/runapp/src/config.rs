//! Configuration loading helpers for the launcher.
//!
//! Configuration flags lead the command line. They are split off and handed
//! to `ortho_config` so the argument parser only sees the launcher's own
//! options and the command to run.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use runapp_config::Config;

use crate::errors::AppError;

/// Flags consumed by the configuration loader rather than the launcher.
const CONFIG_CLI_FLAGS: &[&str] = &["--bus-address", "--log-filter", "--log-format"];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the split-off configuration arguments.
    ///
    /// Configuration flags must appear before any launcher option or the
    /// command; later occurrences belong to the command line proper.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Skip;
    }
    let (flag, has_inline_value) = text
        .split_once('=')
        .map_or((&*text, false), |(flag, _)| (flag, true));
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

/// Arguments split into the configuration loader's share and the rest.
///
/// Both halves start with the program name.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ConfigArgumentSplit::default();
    };

    let mut config_arguments = vec![program.clone()];
    let mut consumed = 0usize;
    let mut pending_value = false;
    for argument in rest {
        if pending_value {
            config_arguments.push(argument.clone());
            consumed += 1;
            pending_value = false;
            continue;
        }
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                consumed += 1;
                pending_value = needs_value;
            }
            FlagAction::Skip => break,
        }
    }

    let mut command_arguments = vec![program.clone()];
    command_arguments.extend(rest.iter().skip(consumed).cloned());
    ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    }
}
