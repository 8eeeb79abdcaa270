//! Unit tests for unit naming, request layout, and job tracking.

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use runapp_bus::transport::{MemoryPeer, MemoryTransport, memory_transport};
use runapp_bus::{Connection, ConnectionState, MessageKind};

use super::*;
use crate::tests::support::{JOB_PATH, StartOutcome, script_systemd};

#[fixture]
fn unit() -> UnitRequest {
    UnitRequest {
        name: String::from("app-sway-foot@00000000000000ff.service"),
        description: String::from("foot"),
        slice: String::from(DEFAULT_SLICE),
        working_dir: Utf8PathBuf::from("/home/user"),
        environment: Vec::new(),
        command: vec![String::from("/usr/bin/foot"), String::from("--server")],
    }
}

fn scripted(outcome: StartOutcome) -> (Connection<MemoryTransport>, MemoryPeer) {
    let (transport, peer) = memory_transport();
    script_systemd(&peer, outcome, true);
    (Connection::with_transport(transport), peer)
}

fn strings(value: &Value) -> Vec<String> {
    let Value::Array(array) = value else {
        panic!("expected an array, got {value:?}");
    };
    array
        .items()
        .iter()
        .map(|item| item.as_str().expect("string item").to_owned())
        .collect()
}

#[rstest]
#[case("foot", None, 0xff, "app-foot@00000000000000ff.service")]
#[case("foot", Some("sway"), 0xff, "app-sway-foot@00000000000000ff.service")]
#[case(
    "org.mozilla.firefox",
    Some("GNOME"),
    0x0123_4567_89ab_cdef,
    "app-GNOME-org.mozilla.firefox@0123456789abcdef.service"
)]
fn unit_names_follow_the_application_scheme(
    #[case] app: &str,
    #[case] desktop: Option<&str>,
    #[case] suffix: u64,
    #[case] expected: &str,
) {
    assert_eq!(unit_name(app, desktop, suffix), expected);
}

#[test]
fn random_suffixes_differ() {
    let first = random_suffix().expect("entropy");
    let second = random_suffix().expect("entropy");
    assert_ne!(first, second);
}

#[rstest]
fn request_lays_out_the_transient_unit(unit: UnitRequest) {
    let (mut connection, peer) = scripted(StartOutcome::Job(String::from("done")));
    let request = build_request(&connection, &unit).expect("request builds");
    assert_eq!(request.signature(), "ssa(sv)a(sa(sv))");
    assert_eq!(request.member(), Some("StartTransientUnit"));

    let handler = connection.create_handler(|_| Ok(()));
    connection.call_async(request, handler).expect("sent");
    let mut sent = peer
        .sent_with_member("StartTransientUnit")
        .pop()
        .expect("request recorded");
    assert_eq!(sent.kind(), MessageKind::MethodCall);

    let [name, mode] = sent.read_fixed::<2>("ss").expect("name and mode");
    assert_eq!(name, Value::from(unit.name.as_str()));
    assert_eq!(mode, Value::from("fail"));

    sent
        .open_container(ContainerKind::Array, "(sv)")
        .expect("properties");
    let mut keys = Vec::new();
    let mut exec_start = None;
    while !sent.at_end() {
        let [property] = sent.read_fixed::<1>("(sv)").expect("property");
        let Value::Struct(entry) = property else {
            panic!("property is not a struct");
        };
        let mut fields = entry.into_iter();
        let raw_key = fields.next().expect("key");
        let value = fields.next().expect("value");
        let key = raw_key.as_str().expect("string key").to_owned();
        if key == "ExecStart" {
            exec_start = value.as_variant().cloned();
        }
        keys.push(key);
    }
    sent.close_container().expect("properties end");
    assert_eq!(
        keys,
        vec![
            "Description",
            "CollectMode",
            "ExitType",
            "Slice",
            "Type",
            "WorkingDirectory",
            "ExecStart"
        ]
    );

    let Some(Value::Array(commands)) = exec_start else {
        panic!("ExecStart is not an array");
    };
    let [Value::Struct(command)] = commands.items() else {
        panic!("expected one command line");
    };
    let [executable, argv, ignore_failure] = command.as_slice() else {
        panic!("command line has the wrong arity");
    };
    assert_eq!(executable, &Value::from("/usr/bin/foot"));
    assert_eq!(strings(argv), unit.command);
    assert_eq!(ignore_failure, &Value::from(false));

    let [raw_aux] = sent.read_fixed::<1>("a(sa(sv))").expect("aux");
    let Value::Array(aux) = raw_aux else {
        panic!("aux is not an array");
    };
    assert!(aux.is_empty());
    assert!(sent.at_end());
}

#[rstest]
fn environment_is_sent_when_given(mut unit: UnitRequest) {
    unit.environment = vec![String::from("A=1"), String::from("B=2")];
    let properties = unit.properties();
    let (key, value) = properties.last().expect("properties");
    assert_eq!(*key, "Environment");
    assert_eq!(strings(value), unit.environment);
}

#[rstest]
fn finished_job_succeeds(unit: UnitRequest) {
    let (mut connection, peer) = scripted(StartOutcome::Job(String::from("done")));
    start_unit(&mut connection, &unit).expect("unit started");

    let matches = peer.sent_with_member("AddMatch");
    assert_eq!(matches.len(), 1, "only JobRemoved needs a bus match rule");
    assert_eq!(connection.handler_count(), 2);
    assert_eq!(connection.state(), ConnectionState::Ready);
}

#[rstest]
#[case::failed("failed", "startup failure")]
#[case::canceled("canceled", "canceled")]
#[case::dependency("dependency", "dependency")]
fn unsuccessful_jobs_are_reported(
    unit: UnitRequest,
    #[case] result: &str,
    #[case] expected: &str,
) {
    let (mut connection, _peer) = scripted(StartOutcome::Job(result.to_owned()));
    let error = start_unit(&mut connection, &unit).expect_err("job failed");
    assert_eq!(error.to_string(), expected);
}

#[rstest]
fn rejected_start_reports_the_remote_error(unit: UnitRequest) {
    let (mut connection, _peer) = scripted(StartOutcome::Reject(String::from(
        "Unit app-foot.service was already loaded",
    )));
    let error = start_unit(&mut connection, &unit).expect_err("start rejected");
    assert!(matches!(error, LaunchError::Bus(BusError::Remote(_))));
    assert_eq!(error.to_string(), "Unit app-foot.service was already loaded");
}

#[rstest]
fn disconnect_ends_the_wait(unit: UnitRequest) {
    let (mut connection, _peer) = scripted(StartOutcome::Disconnect);
    let error = start_unit(&mut connection, &unit).expect_err("bus went away");
    assert_eq!(error.to_string(), "disconnected");
    assert_eq!(connection.state(), ConnectionState::Faulted);
}

#[test]
fn job_state_ignores_other_jobs() {
    let mut state = JobState {
        path: Some(ObjectPath::new(JOB_PATH).expect("path")),
        result: None,
    };
    let other = Value::ObjectPath(ObjectPath::new("/org/freedesktop/systemd1/job/1").expect("path"));
    state.job_removed(&other, &Value::from("done"));
    assert_eq!(state.result, None);

    let ours = Value::ObjectPath(ObjectPath::new(JOB_PATH).expect("path"));
    state.job_removed(&ours, &Value::from("done"));
    assert_eq!(state.result.as_deref(), Some("done"));

    state.disconnected();
    assert_eq!(state.result.as_deref(), Some("done"));
}

#[test]
fn signals_before_the_reply_are_ignored() {
    let mut state = JobState::default();
    let ours = Value::ObjectPath(ObjectPath::new(JOB_PATH).expect("path"));
    state.job_removed(&ours, &Value::from("done"));
    assert_eq!(state.result, None);
}
