//! Command-line arguments of the launcher.

use camino::Utf8PathBuf;
use clap::Parser;

use crate::launch::DEFAULT_SLICE;

/// Run COMMAND as a systemd user unit, in a way suitable for typical
/// applications.
#[derive(Parser, Debug)]
#[command(name = "runapp", disable_version_flag = true)]
pub(crate) struct Cli {
    /// Print what is being launched and whether it succeeded.
    #[arg(short, long)]
    pub(crate) verbose: bool,
    /// Assign the unit to the given slice (name must end in ".slice").
    #[arg(
        short = 'i',
        long,
        value_name = "SLICE",
        default_value = DEFAULT_SLICE,
        value_parser = parse_slice
    )]
    pub(crate) slice: String,
    /// Set the working directory of the command.
    #[arg(short, long, value_name = "DIR")]
    pub(crate) dir: Option<Utf8PathBuf>,
    /// Run the command with the given environment variable set; may be
    /// repeated.
    #[arg(
        short,
        long = "env",
        value_name = "VAR=VALUE",
        value_parser = parse_env_assignment
    )]
    pub(crate) env: Vec<String>,
    /// The command to run, followed by its own arguments.
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub(crate) command: Vec<String>,
}

impl Cli {
    /// Returns the executable, which is always present after parsing.
    pub(crate) fn executable(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }
}

fn parse_slice(value: &str) -> Result<String, String> {
    if value.ends_with(".slice") {
        Ok(value.to_owned())
    } else {
        Err(String::from("slice name must end with \".slice\""))
    }
}

fn parse_env_assignment(value: &str) -> Result<String, String> {
    match value.split_once('=') {
        Some((name, _)) if !name.is_empty() => Ok(value.to_owned()),
        _ => Err(String::from("must be of the form VAR=VALUE")),
    }
}
