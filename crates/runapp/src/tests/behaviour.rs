//! Behavioural tests for the launcher run against a scripted bus.

use std::cell::RefCell;
use std::process::ExitCode;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use runapp_bus::Value;

use super::support::{self, StartOutcome, TestWorld};

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<TestWorld> {
    support::world()
}

#[given("the desktop environment is \"{desktops}\"")]
fn given_desktop_environment(world: &RefCell<TestWorld>, desktops: String) {
    world.borrow_mut().environment.current_desktop = Some(desktops);
}

#[given("the launcher was started for desktop entry \"{id}\"")]
fn given_desktop_entry(world: &RefCell<TestWorld>, id: String) {
    world.borrow_mut().environment.desktop_file_id = Some(id);
}

#[given("systemd reports the job result \"{result}\"")]
fn given_job_result(world: &RefCell<TestWorld>, result: String) {
    world
        .borrow_mut()
        .connector
        .set_outcome(StartOutcome::Job(result));
}

#[given("systemd rejects the start with \"{text}\"")]
fn given_rejected_start(world: &RefCell<TestWorld>, text: String) {
    world
        .borrow_mut()
        .connector
        .set_outcome(StartOutcome::Reject(text));
}

#[given("no notification server is running")]
fn given_no_notification_server(world: &RefCell<TestWorld>) {
    world.borrow_mut().connector.disable_notifications();
}

#[given("stdin is not a terminal")]
fn given_stdin_not_terminal(world: &RefCell<TestWorld>) {
    world.borrow_mut().environment.stdin_is_terminal = false;
}

#[given("the bus refuses connections")]
fn given_bus_refuses(world: &RefCell<TestWorld>) {
    world.borrow_mut().connector.refuse_connections();
}

#[when("runapp runs \"{command_line}\"")]
fn when_runapp_runs(world: &RefCell<TestWorld>, command_line: String) {
    world.borrow_mut().run(&command_line);
}

#[then("the exit status is {status}")]
fn then_exit_status(world: &RefCell<TestWorld>, status: u8) -> StepResult {
    let actual = world.borrow().exit_code();
    if actual == Some(ExitCode::from(status)) {
        Ok(())
    } else {
        Err(format!("expected exit status {status}, got {actual:?}"))
    }
}

#[then("stderr is empty")]
fn then_stderr_empty(world: &RefCell<TestWorld>) {
    let stderr = world.borrow().stderr();
    assert!(stderr.is_empty(), "unexpected stderr: {stderr}");
}

#[then("stdout mentions \"{text}\"")]
fn then_stdout_mentions(world: &RefCell<TestWorld>, text: String) {
    let stdout = world.borrow().stdout();
    assert!(stdout.contains(&text), "stdout lacks {text:?}: {stdout}");
}

#[then("stderr mentions \"{text}\"")]
fn then_stderr_mentions(world: &RefCell<TestWorld>, text: String) {
    let stderr = world.borrow().stderr();
    assert!(stderr.contains(&text), "stderr lacks {text:?}: {stderr}");
}

#[then("systemd was asked to start a unit named like \"{prefix}\"")]
fn then_unit_named(world: &RefCell<TestWorld>, prefix: String) -> StepResult {
    let mut starts = world
        .borrow()
        .connector
        .sent_with_member("StartTransientUnit");
    let mut request = starts
        .pop()
        .ok_or_else(|| String::from("no unit start was sent"))?;
    let name: String = request
        .read_value("s")
        .map_err(|error| format!("unit name unreadable: {error}"))?;
    if name.starts_with(&prefix) && name.ends_with(".service") {
        Ok(())
    } else {
        Err(format!("unit name {name:?} does not start with {prefix:?}"))
    }
}

#[then("no notification was sent")]
fn then_no_notification(world: &RefCell<TestWorld>) {
    let notifications = world.borrow().connector.sent_with_member("Notify");
    assert!(notifications.is_empty(), "unexpected notification");
}

#[then("a critical notification says \"{summary}\"")]
fn then_notification_sent(world: &RefCell<TestWorld>, summary: String) -> StepResult {
    let mut notifications = world.borrow().connector.sent_with_member("Notify");
    let mut notification = notifications
        .pop()
        .ok_or_else(|| String::from("no notification was sent"))?;
    let [_, _, _, sent_summary, _, _] = notification
        .read_fixed::<6>("susssas")
        .map_err(|error| format!("notification unreadable: {error}"))?;
    if sent_summary == Value::from(summary.as_str()) {
        Ok(())
    } else {
        Err(format!("notification summary was {sent_summary:?}"))
    }
}

#[scenario(path = "tests/features/launch.feature")]
fn launch(world: RefCell<TestWorld>) -> Result<(), String> {
    let _ = world;
    Ok(())
}
