//! Entrypoint for the `runapp` launcher.
//!
//! The binary delegates to [`runapp::run`], which parses the command line,
//! loads configuration, and starts the command as a transient systemd user
//! unit over the session bus.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    runapp::run(std::env::args_os(), &mut stdout, &mut stderr)
}
