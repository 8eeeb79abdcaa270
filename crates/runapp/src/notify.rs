//! Desktop notification of launch failures.

use runapp_bus::transport::Transport;
use runapp_bus::{Array, BusError, Connection, ContainerKind, Message, MessageError, Type, Value};

const NOTIFICATIONS_NAME: &str = "org.freedesktop.Notifications";
const NOTIFICATIONS_PATH: &str = "/org/freedesktop/Notifications";
const NOTIFICATIONS_INTERFACE: &str = "org.freedesktop.Notifications";

/// `urgency` hint value for critical notifications.
const CRITICAL_URGENCY: u8 = 2;
/// Expiry timeout meaning "never expire".
const NEVER_EXPIRE: i32 = 0;

/// Builds the `Notify(susssasa{sv}i)` call for a critical error.
pub(crate) fn build_notification<T: Transport>(
    connection: &Connection<T>,
    summary: &str,
    desktop_entry: Option<&str>,
) -> Result<Message, MessageError> {
    let mut request = connection.create_request(
        Some(NOTIFICATIONS_NAME),
        NOTIFICATIONS_PATH,
        Some(NOTIFICATIONS_INTERFACE),
        "Notify",
    )?;
    // app_name, replaces_id, app_icon, summary, body, actions
    request.append(
        "susssas",
        &[
            Value::from(""),
            Value::from(0_u32),
            Value::from(""),
            Value::from(summary),
            Value::from(""),
            Value::from(Array::new(Type::String)),
        ],
    )?;

    request.open_container(ContainerKind::Array, "{sv}")?;
    if let Some(entry) = desktop_entry {
        request.append(
            "{sv}",
            &[Value::dict_entry("desktop-entry", Value::variant(entry))],
        )?;
    }
    request.append(
        "{sv}",
        &[Value::dict_entry("urgency", Value::variant(CRITICAL_URGENCY))],
    )?;
    request.close_container()?;

    request.append("i", &[Value::from(NEVER_EXPIRE)])?;
    Ok(request)
}

/// Shows `summary` as a critical notification and waits for the server to
/// accept it.
pub(crate) fn notify_error<T: Transport>(
    connection: &mut Connection<T>,
    summary: &str,
    desktop_entry: Option<&str>,
) -> Result<(), BusError> {
    let request = build_notification(connection, summary, desktop_entry)?;
    let mut reply = connection.call(request)?;
    let id: u32 = reply.read_value("u")?;
    tracing::debug!(target: crate::launch::LAUNCH_TARGET, id, "error notification shown");
    Ok(())
}
