//! Behavioural tests for calls, signals and deferred errors on a driven
//! connection.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::connection::ConnectionState;
use crate::error::{EncodingError, MessageError};
use crate::message::Value;

use super::support::{self, TestWorld, job_removed};

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<TestWorld> {
    support::world()
}

#[given("a peer that answers unit starts with job \"{job}\"")]
fn given_answering_peer(world: &RefCell<TestWorld>, job: String) {
    world.borrow().answer_with_job(job);
}

#[given("a peer that rejects unit starts with \"{text}\"")]
fn given_rejecting_peer(world: &RefCell<TestWorld>, text: String) {
    world
        .borrow()
        .answer_with_error("org.freedesktop.systemd1.NoSuchUnit", text);
}

#[given("a subscription to job removals logging \"{label}\"")]
fn given_job_subscription(world: &RefCell<TestWorld>, label: String) -> StepResult {
    let mut state = world.borrow_mut();
    state.subscribe_job_removed(&label);
    expect_accepted(state.call_result.as_ref())
}

#[given("a subscription to the local disconnect logging \"{label}\"")]
fn given_disconnect_subscription(world: &RefCell<TestWorld>, label: String) -> StepResult {
    let mut state = world.borrow_mut();
    state.subscribe_disconnected(&label);
    expect_accepted(state.call_result.as_ref())
}

#[when("a unit start is issued with handler \"{label}\"")]
fn when_unit_started(world: &RefCell<TestWorld>, label: String) -> StepResult {
    let mut state = world.borrow_mut();
    state.start_unit(&label);
    expect_accepted(state.call_result.as_ref())
}

#[when("a unit start is issued with a handler failing with \"{text}\"")]
fn when_failing_unit_started(world: &RefCell<TestWorld>, text: String) -> StepResult {
    let mut state = world.borrow_mut();
    state.start_failing_unit(&text);
    expect_accepted(state.call_result.as_ref())
}

#[when("a request appends a number where a string is expected")]
fn when_mismatched_append(world: &RefCell<TestWorld>) {
    world
        .borrow_mut()
        .append_mismatched("s", Value::from(42_u32));
}

#[when("the request is sent")]
fn when_request_sent(world: &RefCell<TestWorld>) {
    world.borrow_mut().send_built_request();
}

#[when("the peer emits a job removal")]
fn when_job_removed(world: &RefCell<TestWorld>) -> StepResult {
    world
        .borrow()
        .peer
        .deliver(job_removed(7, "/org/freedesktop/systemd1/job/7", "app.service", "done"))
        .map(|_| ())
        .map_err(|error| format!("signal could not be queued: {error}"))
}

#[when("the peer disconnects")]
fn when_peer_disconnects(world: &RefCell<TestWorld>) {
    world.borrow().peer.disconnect();
}

#[when("the connection is driven")]
fn when_driven(world: &RefCell<TestWorld>) {
    world.borrow_mut().drive();
}

#[then("driving succeeds")]
fn then_driving_succeeds(world: &RefCell<TestWorld>) {
    let state = world.borrow();
    let result = state.drive_result.as_ref().expect("drive result missing");
    assert!(result.is_ok(), "drive failed: {result:?}");
}

#[then("driving fails with \"{text}\"")]
fn then_driving_fails(world: &RefCell<TestWorld>, text: String) {
    let state = world.borrow();
    let result = state.drive_result.as_ref().expect("drive result missing");
    let error = result.as_ref().expect_err("drive succeeded unexpectedly");
    assert_eq!(error.to_string(), text);
}

#[then("the handler log is \"{expected}\"")]
fn then_handler_log(world: &RefCell<TestWorld>, expected: String) {
    let labels: Vec<String> = expected.split(',').map(str::to_owned).collect();
    assert_eq!(world.borrow().logged(), labels);
}

#[then("the handler log is empty")]
fn then_handler_log_empty(world: &RefCell<TestWorld>) {
    let logged = world.borrow().logged();
    assert!(logged.is_empty(), "handlers fired: {logged:?}");
}

#[then("no handlers remain attached")]
fn then_no_handlers(world: &RefCell<TestWorld>) {
    assert_eq!(world.borrow().connection.handler_count(), 0);
}

#[then("the reporter suppressed \"{text}\"")]
fn then_reporter_suppressed(world: &RefCell<TestWorld>, text: String) {
    assert_eq!(world.borrow().reporter.suppressed(), vec![text]);
}

#[then("the append is rejected")]
fn then_append_rejected(world: &RefCell<TestWorld>) {
    let state = world.borrow();
    let error = state.append_error().expect("append succeeded unexpectedly");
    assert!(
        matches!(error, MessageError::Encoding(EncodingError::TypeMismatch { .. })),
        "unexpected append error: {error:?}"
    );
}

#[then("sending is rejected")]
fn then_sending_rejected(world: &RefCell<TestWorld>) {
    let state = world.borrow();
    let result = state.call_result.as_ref().expect("send result missing");
    assert!(result.is_err(), "poisoned request was accepted");
}

#[then("nothing was sent to the peer")]
fn then_nothing_sent(world: &RefCell<TestWorld>) {
    assert!(world.borrow().peer.sent().is_empty());
}

#[then("the connection is faulted")]
fn then_connection_faulted(world: &RefCell<TestWorld>) {
    assert_eq!(
        world.borrow().connection.state(),
        ConnectionState::Faulted
    );
}

#[scenario(path = "tests/features/driving.feature")]
fn driving(world: RefCell<TestWorld>) -> Result<(), String> {
    let _ = world;
    Ok(())
}

fn expect_accepted<E: std::fmt::Debug>(result: Option<&Result<(), E>>) -> StepResult {
    match result {
        Some(Ok(())) => Ok(()),
        Some(Err(error)) => Err(format!("request rejected: {error:?}")),
        None => Err("no request was issued".to_owned()),
    }
}
