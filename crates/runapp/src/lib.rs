//! Launcher runtime: runs a command as a transient systemd user unit.
//!
//! [`run`] parses the command line, loads layered configuration, connects to
//! the user bus, and asks systemd to start the command as a service unit in
//! an application slice. When the start fails the error is printed and, if
//! the launcher was not started from a terminal, also shown as a desktop
//! notification. Configuration loading, bus access, and the process
//! environment are injected so tests can run the whole flow against a
//! scripted bus.

use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use runapp_bus::transport::{Transport, UnixTransport};
use runapp_bus::{ConnectError, Connection};
use runapp_config::Config;

mod cli;
mod config;
mod desktop;
mod errors;
mod launch;
mod notify;
mod telemetry;

use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
use desktop::LaunchEnvironment;
use errors::AppError;
use launch::{LAUNCH_TARGET, UnitRequest, random_suffix, start_unit, unit_name};
use notify::notify_error;

/// Exit status for command-line usage errors.
const USAGE_EXIT: u8 = 2;

/// Bundles the output streams and the verbosity flag.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    stdout: &'a mut W,
    stderr: &'a mut E,
    verbose: bool,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self {
            stdout,
            stderr,
            verbose: false,
        }
    }

    fn out(&mut self, message: fmt::Arguments<'_>) {
        if let Err(error) = writeln!(self.stdout, "{message}") {
            tracing::debug!(target: LAUNCH_TARGET, error = %error, "failed to write to stdout");
        }
    }

    fn err(&mut self, message: fmt::Arguments<'_>) {
        if let Err(error) = writeln!(self.stderr, "{message}") {
            tracing::debug!(target: LAUNCH_TARGET, error = %error, "failed to write to stderr");
        }
    }

    /// Prints `message` on stdout only in verbose mode.
    fn verbose(&mut self, message: fmt::Arguments<'_>) {
        if self.verbose {
            self.out(message);
        }
    }
}

/// Opens the bus connection used for the launch.
pub(crate) trait BusConnector {
    type Transport: Transport;

    /// Connects to the bus selected by `config`.
    fn connect(&self, config: &Config) -> Result<Connection<Self::Transport>, ConnectError>;
}

/// Connects to the configured address, or to the user's session bus.
pub(crate) struct SessionBusConnector;

impl BusConnector for SessionBusConnector {
    type Transport = UnixTransport;

    fn connect(&self, config: &Config) -> Result<Connection<UnixTransport>, ConnectError> {
        let address = config.resolve_bus_address()?;
        Connection::connect(&address)
    }
}

struct Launcher<'a, 'io, W: Write, E: Write, L: ConfigLoader, C: BusConnector> {
    io: &'a mut IoStreams<'io, W, E>,
    loader: &'a L,
    connector: &'a C,
    environment: &'a LaunchEnvironment,
}

impl<W, E, L, C> Launcher<'_, '_, W, E, L, C>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
    C: BusConnector,
{
    fn run<I>(&mut self, raw_args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = raw_args.into_iter().collect();
        let split = split_config_arguments(&args);
        let cli = match Cli::try_parse_from(&split.command_arguments) {
            Ok(cli) => cli,
            Err(error) => return self.report_usage(&error),
        };
        self.io.verbose = cli.verbose;

        match self.launch(&cli, &split.config_arguments) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                if !error.is_launch_failure() {
                    self.io.err(format_args!("{error}"));
                }
                ExitCode::FAILURE
            }
        }
    }

    fn report_usage(&mut self, error: &clap::Error) -> ExitCode {
        let rendered = error.render();
        if error.use_stderr() {
            self.io.err(format_args!("{rendered}"));
            ExitCode::from(USAGE_EXIT)
        } else {
            self.io.out(format_args!("{rendered}"));
            ExitCode::SUCCESS
        }
    }

    fn launch(&mut self, cli: &Cli, config_arguments: &[OsString]) -> Result<(), AppError> {
        let config = self.loader.load(config_arguments)?;
        telemetry::initialise(&config)?;

        let app = self.environment.app_name(cli.executable());
        let working_dir = self
            .environment
            .resolve_working_dir(cli.dir.as_deref())
            .ok_or(AppError::WorkingDirectory)?;

        let mut connection = match self.connector.connect(&config) {
            Ok(connection) => connection,
            Err(connect_error) => {
                let error = AppError::from(connect_error);
                self.io.err(format_args!("Failed to start {app}: {error}"));
                return Err(error);
            }
        };

        let result = random_suffix().and_then(|suffix| {
            let unit = UnitRequest {
                name: unit_name(&app, self.environment.desktop_name(), suffix),
                description: app.clone(),
                slice: cli.slice.clone(),
                working_dir,
                environment: cli.env.clone(),
                command: cli.command.clone(),
            };
            self.io
                .verbose(format_args!("Launching {}: {:?}", unit.name, unit.command));
            start_unit(&mut connection, &unit)
        });

        match result {
            Ok(()) => {
                self.io.verbose(format_args!("Success"));
                Ok(())
            }
            Err(error) => {
                let summary = format!("Failed to start {app}: {error}");
                self.io.err(format_args!("{summary}"));
                if !self.environment.stdin_is_terminal {
                    self.notify(&mut connection, &summary);
                }
                Err(error.into())
            }
        }
    }

    fn notify(&mut self, connection: &mut Connection<C::Transport>, summary: &str) {
        self.io.verbose(format_args!(
            "Notifying user of error via org.freedesktop.Notifications"
        ));
        if let Err(error) = notify_error(connection, summary, self.environment.desktop_entry()) {
            self.io.err(format_args!(
                "Failed to notify user of error via org.freedesktop.Notifications: {error}"
            ));
        }
    }
}

/// Runs the launcher with the given arguments and output streams.
///
/// Returns `0` once the unit started, `1` when it could not be started, and
/// `2` for command-line usage errors.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    let environment = LaunchEnvironment::capture();
    run_with(
        args,
        &mut io,
        &OrthoConfigLoader,
        &SessionBusConnector,
        &environment,
    )
}

/// Runs the launcher with injected collaborators.
#[must_use]
pub(crate) fn run_with<I, W, E, L, C>(
    args: I,
    io: &mut IoStreams<'_, W, E>,
    loader: &L,
    connector: &C,
    environment: &LaunchEnvironment,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
    C: BusConnector,
{
    Launcher {
        io,
        loader,
        connector,
        environment,
    }
    .run(args)
}

#[cfg(test)]
mod tests;
