//! Structured reporting of connection events.

use std::rc::Rc;

use crate::error::BusError;
use crate::message::Message;

/// Tracing target for connection diagnostics.
pub(crate) const CONNECTION_TARGET: &str = "runapp_bus::connection";

/// Observer for traffic and diagnostics on a connection.
pub trait BusReporter {
    /// Invoked after a message has been serialized and handed to the transport.
    fn message_sent(&self, message: &Message);

    /// Invoked for every inbound message before it is dispatched.
    fn message_received(&self, message: &Message);

    /// Invoked when a reply arrives for a call nobody is waiting on.
    fn unmatched_reply(&self, message: &Message);

    /// Invoked when a deferred error is dropped because an earlier one is
    /// still waiting to be returned from `drive`.
    fn suppressed_error(&self, error: &BusError);

    /// Invoked when the peer closes the connection.
    fn disconnected(&self, released_calls: usize);
}

impl<T> BusReporter for Rc<T>
where
    T: BusReporter + ?Sized,
{
    fn message_sent(&self, message: &Message) {
        (**self).message_sent(message);
    }

    fn message_received(&self, message: &Message) {
        (**self).message_received(message);
    }

    fn unmatched_reply(&self, message: &Message) {
        (**self).unmatched_reply(message);
    }

    fn suppressed_error(&self, error: &BusError) {
        (**self).suppressed_error(error);
    }

    fn disconnected(&self, released_calls: usize) {
        (**self).disconnected(released_calls);
    }
}

/// Default reporter that records connection events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredBusReporter;

impl StructuredBusReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl BusReporter for StructuredBusReporter {
    fn message_sent(&self, message: &Message) {
        tracing::trace!(
            target: CONNECTION_TARGET,
            event = "message_sent",
            kind = %message.kind(),
            serial = message.serial(),
            destination = message.destination().unwrap_or_default(),
            member = message.member().unwrap_or_default(),
            signature = message.signature(),
            "sent message"
        );
    }

    fn message_received(&self, message: &Message) {
        tracing::trace!(
            target: CONNECTION_TARGET,
            event = "message_received",
            kind = %message.kind(),
            serial = message.serial(),
            reply_serial = message.reply_serial().unwrap_or_default(),
            sender = message.sender().unwrap_or_default(),
            member = message.member().unwrap_or_default(),
            "received message"
        );
    }

    fn unmatched_reply(&self, message: &Message) {
        tracing::debug!(
            target: CONNECTION_TARGET,
            event = "unmatched_reply",
            kind = %message.kind(),
            reply_serial = message.reply_serial().unwrap_or_default(),
            "ignoring reply with no waiting handler"
        );
    }

    fn suppressed_error(&self, error: &BusError) {
        tracing::warn!(
            target: CONNECTION_TARGET,
            event = "suppressed_error",
            error = %error,
            "additional error while an earlier one is pending"
        );
    }

    fn disconnected(&self, released_calls: usize) {
        tracing::info!(
            target: CONNECTION_TARGET,
            event = "disconnected",
            released_calls,
            "bus peer closed the connection"
        );
    }
}
