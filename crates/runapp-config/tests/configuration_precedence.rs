//! Behavioural tests for configuration layer precedence.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use runapp_config::{Config, LogFormat, default_log_filter, default_log_format};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const ENV_KEYS: &[&str] = &["RUNAPP_BUS_ADDRESS", "RUNAPP_LOG_FILTER", "RUNAPP_LOG_FORMAT"];

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
    _guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        let harness = Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("runapp")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
            _guard: guard,
        };
        for key in ENV_KEYS {
            harness.clear_env(key);
        }
        harness
    }

    fn write_config(&self, contents: &str) {
        let path = self.temp_dir.path().join("runapp.toml");
        if let Err(error) = fs::write(&path, contents) {
            panic!("failed to write configuration: {error}");
        }
        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn remember(&self, key: &str) {
        let previous = std::env::var_os(key);
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn set_env(&self, key: &str, value: &str) {
        self.remember(key);
        // Environment mutation is `unsafe` on edition 2024; the mutex held by
        // the harness serialises it and `Drop` restores the previous values.
        unsafe { std::env::set_var(key, value) };
    }

    fn clear_env(&self, key: &str) {
        self.remember(key);
        unsafe { std::env::remove_var(key) };
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }

        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => *self.loaded.borrow_mut() = Some(config),
            Err(error) => *self.error.borrow_mut() = Some(error.to_string()),
        }
    }

    fn loaded_config(&self) -> Config {
        self.load();
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            match value {
                Some(os_value) => unsafe { std::env::set_var(&key, os_value) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the bus address to \"{address}\"")]
fn given_configuration_file(harness: &Harness, address: String) {
    harness.write_config(&format!("bus_address = \"{address}\"\n"));
}

#[given("a configuration file setting the log format to \"{format}\"")]
fn given_log_format_file(harness: &Harness, format: String) {
    harness.write_config(&format!("log_format = \"{format}\"\n"));
}

#[given("the environment overrides the bus address to \"{address}\"")]
fn given_environment_override(harness: &Harness, address: String) {
    harness.set_env("RUNAPP_BUS_ADDRESS", &address);
}

#[when("the CLI sets the bus address to \"{address}\"")]
fn when_cli_override(harness: &Harness, address: String) {
    harness.push_cli_arg("--bus-address");
    harness.push_cli_arg(OsString::from(&address));
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

#[then("loading the configuration resolves the bus address to \"{address}\"")]
fn then_resolved_address(harness: &Harness, address: String) {
    let config = harness.loaded_config();
    assert_eq!(config.bus_address(), Some(address.as_str()));
}

#[then("loading the configuration selects the json log format")]
fn then_json_format(harness: &Harness) {
    let config = harness.loaded_config();
    assert_eq!(config.log_format(), LogFormat::Json);
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.loaded_config();
    assert_eq!(config.bus_address(), None);
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
}

#[scenario(path = "tests/features/configuration_precedence.feature")]
fn configuration_precedence(#[from(harness)] harness: Harness) {
    let _ = harness;
}
