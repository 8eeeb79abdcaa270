//! Starting a command as a transient systemd user unit.
//!
//! The launcher asks the user manager to start a service unit whose
//! `ExecStart` is the command, then waits for the `JobRemoved` signal of the
//! job the manager created. The call is equivalent to:
//!
//! ```text
//! systemd-run --user --unit=NAME --description=APP --service-type=exec \
//!     --property=ExitType=cgroup --same-dir --slice=SLICE --collect -- COMMAND
//! ```

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use camino::Utf8PathBuf;
use runapp_bus::transport::Transport;
use runapp_bus::{
    Array, BusError, Connection, ContainerKind, DISCONNECTED_MEMBER, LOCAL_INTERFACE, Message,
    MessageError, ObjectPath, Type, Value,
};
use thiserror::Error;

pub(crate) const LAUNCH_TARGET: &str = "runapp::launch";

/// Slice applied when none is given on the command line.
pub(crate) const DEFAULT_SLICE: &str = "app-graphical.slice";

const SYSTEMD_NAME: &str = "org.freedesktop.systemd1";
const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";

/// Job result reported for a unit that started.
const RESULT_DONE: &str = "done";
/// Job result reported for a unit that failed to start.
const RESULT_FAILED: &str = "failed";
/// Pseudo job result recorded when the bus goes away first.
const RESULT_DISCONNECTED: &str = "disconnected";

/// Failures while starting the unit.
#[derive(Debug, Error)]
pub(crate) enum LaunchError {
    #[error("failed to get random bytes: {0}")]
    Entropy(#[source] io::Error),
    #[error("startup failure")]
    StartupFailure,
    #[error("{result}")]
    Job { result: String },
    #[error(transparent)]
    Request(#[from] MessageError),
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Everything needed to describe the transient unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnitRequest {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) slice: String,
    pub(crate) working_dir: Utf8PathBuf,
    pub(crate) environment: Vec<String>,
    /// Executable followed by its arguments; never empty.
    pub(crate) command: Vec<String>,
}

impl UnitRequest {
    fn executable(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }

    /// Unit properties other than `ExecStart`, in the order they are sent.
    fn properties(&self) -> Vec<(&'static str, Value)> {
        let mut properties = vec![
            ("Description", Value::from(&self.description)),
            ("CollectMode", Value::from("inactive-or-failed")),
            ("ExitType", Value::from("cgroup")),
            ("Slice", Value::from(&self.slice)),
            ("Type", Value::from("exec")),
            ("WorkingDirectory", Value::from(self.working_dir.as_str())),
        ];
        if !self.environment.is_empty() {
            properties.push(("Environment", string_array(&self.environment)));
        }
        properties
    }
}

/// Builds `app[-DESKTOP]-APP@SUFFIX.service`.
pub(crate) fn unit_name(app: &str, desktop: Option<&str>, suffix: u64) -> String {
    let desktop_part = desktop.map(|name| format!("-{name}")).unwrap_or_default();
    format!("app{desktop_part}-{app}@{suffix:016x}.service")
}

/// Draws the random instance suffix of the unit name.
#[expect(
    clippy::little_endian_bytes,
    reason = "random bytes are uniform in either byte order"
)]
pub(crate) fn random_suffix() -> Result<u64, LaunchError> {
    let mut bytes = [0_u8; 8];
    fill_random(&mut bytes).map_err(LaunchError::Entropy)?;
    Ok(u64::from_le_bytes(bytes))
}

#[cfg(target_os = "linux")]
fn fill_random(buffer: &mut [u8]) -> io::Result<()> {
    // SAFETY: the pointer and length describe `buffer`, which is writable
    // for the duration of the call.
    let written = unsafe { libc::getrandom(buffer.as_mut_ptr().cast(), buffer.len(), 0) };
    if usize::try_from(written).ok() == Some(buffer.len()) {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
fn fill_random(buffer: &mut [u8]) -> io::Result<()> {
    use std::io::Read;

    std::fs::File::open("/dev/urandom")?.read_exact(buffer)
}

/// Builds the `StartTransientUnit(ss a(sv) a(sa(sv)))` call.
pub(crate) fn build_request<T: Transport>(
    connection: &Connection<T>,
    unit: &UnitRequest,
) -> Result<Message, MessageError> {
    let mut request = connection.create_request(
        Some(SYSTEMD_NAME),
        SYSTEMD_PATH,
        Some(MANAGER_INTERFACE),
        "StartTransientUnit",
    )?;
    request.append("ss", &[Value::from(&unit.name), Value::from("fail")])?;

    request.open_container(ContainerKind::Array, "(sv)")?;
    for (key, value) in unit.properties() {
        request.append("(sv)", &[Value::from(vec![Value::from(key), Value::variant(value)])])?;
    }
    append_exec_start(&mut request, unit)?;
    request.close_container()?;

    let aux = Type::Struct(vec![
        Type::String,
        Type::Array(Box::new(Type::Struct(vec![Type::String, Type::Variant]))),
    ]);
    request.append("a(sa(sv))", &[Value::from(Array::new(aux))])?;
    Ok(request)
}

/// Appends `ExecStart` as `(s v(a(sasb)))` holding one command line.
fn append_exec_start(request: &mut Message, unit: &UnitRequest) -> Result<(), MessageError> {
    request.open_container(ContainerKind::Struct, "sv")?;
    request.append("s", &[Value::from("ExecStart")])?;
    request.open_container(ContainerKind::Variant, "a(sasb)")?;
    request.open_container(ContainerKind::Array, "(sasb)")?;
    request.open_container(ContainerKind::Struct, "sasb")?;
    request.append(
        "sas",
        &[Value::from(unit.executable()), string_array(&unit.command)],
    )?;
    // ignore-failure flag
    request.append("b", &[Value::from(false)])?;
    for _ in 0..4 {
        request.close_container()?;
    }
    Ok(())
}

fn string_array(items: &[String]) -> Value {
    Value::from(Array::with_items(
        Type::String,
        items.iter().map(Value::from).collect(),
    ))
}

/// Progress of the start job as observed through handlers.
#[derive(Debug, Default)]
struct JobState {
    path: Option<ObjectPath>,
    result: Option<String>,
}

impl JobState {
    fn job_removed(&mut self, path: &Value, result: &Value) {
        let ours = match (&self.path, path.as_object_path()) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        };
        if ours && let Some(text) = result.as_str() {
            self.result = Some(text.to_owned());
        }
    }

    fn disconnected(&mut self) {
        if self.result.is_none() {
            self.result = Some(RESULT_DISCONNECTED.to_owned());
        }
    }
}

/// Starts `unit` and drives the connection until its job finishes.
pub(crate) fn start_unit<T: Transport>(
    connection: &mut Connection<T>,
    unit: &UnitRequest,
) -> Result<(), LaunchError> {
    let request = build_request(connection, unit)?;
    let job = Rc::new(RefCell::new(JobState::default()));

    let removed_state = Rc::clone(&job);
    let on_job_removed = connection.create_handler(move |signal| {
        let [_, path, _, result] = signal.read_fixed::<4>("uoss")?;
        removed_state.borrow_mut().job_removed(&path, &result);
        Ok(())
    });
    connection.subscribe_signal(
        Some(SYSTEMD_NAME),
        Some(SYSTEMD_PATH),
        MANAGER_INTERFACE,
        "JobRemoved",
        on_job_removed,
    )?;

    let disconnected_state = Rc::clone(&job);
    let on_disconnected = connection.create_handler(move |_| {
        disconnected_state.borrow_mut().disconnected();
        Ok(())
    });
    connection.subscribe_signal(
        Some(LOCAL_INTERFACE),
        None,
        LOCAL_INTERFACE,
        DISCONNECTED_MEMBER,
        on_disconnected,
    )?;

    let started_state = Rc::clone(&job);
    let on_started = connection.create_handler(move |reply| {
        let path: ObjectPath = reply.read_value("o")?;
        tracing::debug!(target: LAUNCH_TARGET, job = %path, "start job queued");
        started_state.borrow_mut().path = Some(path);
        Ok(())
    });
    tracing::info!(target: LAUNCH_TARGET, unit = %unit.name, "starting transient unit");
    connection.call_async(request, on_started)?;

    connection.drive_until(|| job.borrow().result.is_some())?;
    let result = job.borrow_mut().result.take().unwrap_or_default();
    tracing::debug!(
        target: LAUNCH_TARGET,
        unit = %unit.name,
        result = result.as_str(),
        "start job finished"
    );
    job_outcome(result)
}

fn job_outcome(result: String) -> Result<(), LaunchError> {
    match result.as_str() {
        RESULT_DONE => Ok(()),
        RESULT_FAILED => Err(LaunchError::StartupFailure),
        _ => Err(LaunchError::Job { result }),
    }
}

#[cfg(test)]
mod tests;
