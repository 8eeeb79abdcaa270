//! BDD test world: scripted bus, captured output, and the launcher's exit
//! status.

use std::cell::RefCell;
use std::ffi::OsString;
use std::process::ExitCode;

use camino::Utf8PathBuf;

use crate::desktop::LaunchEnvironment;
use crate::{IoStreams, run_with};

use super::bus::{ScriptedBusConnector, StartOutcome, TestConfigLoader};

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    pub connector: ScriptedBusConnector,
    pub environment: LaunchEnvironment,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<ExitCode>,
}

impl TestWorld {
    /// Builds a world whose manager starts every unit successfully.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connector: ScriptedBusConnector::new(StartOutcome::Job(String::from("done"))),
            environment: LaunchEnvironment {
                working_dir: Some(Utf8PathBuf::from("/home/user")),
                stdin_is_terminal: true,
                ..LaunchEnvironment::default()
            },
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
        }
    }

    /// Runs the launcher with a whitespace-separated command line.
    pub fn run(&mut self, command_line: &str) {
        let args: Vec<OsString> = std::iter::once("runapp")
            .chain(command_line.split_whitespace())
            .map(OsString::from)
            .collect();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit_code = {
            let mut io = IoStreams::new(&mut stdout, &mut stderr);
            run_with(
                args,
                &mut io,
                &TestConfigLoader,
                &self.connector,
                &self.environment,
            )
        };
        self.stdout = stdout;
        self.stderr = stderr;
        self.exit_code = Some(exit_code);
    }

    /// Returns the exit status of the last run.
    #[must_use]
    pub const fn exit_code(&self) -> Option<ExitCode> {
        self.exit_code
    }

    /// Returns captured stdout.
    #[must_use]
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Returns captured stderr.
    #[must_use]
    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture constructing a fresh test world.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
