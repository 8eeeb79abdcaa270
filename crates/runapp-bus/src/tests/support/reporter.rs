//! Test double for [`BusReporter`] that records events for assertions.

use std::cell::RefCell;

use crate::error::BusError;
use crate::message::Message;
use crate::reporter::BusReporter;

/// Connection events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A message with this member (or kind, when memberless) was sent.
    Sent(String),
    /// A reply arrived for a call nobody waits on.
    UnmatchedReply(u32),
    /// A deferred error was dropped; holds its text.
    Suppressed(String),
    /// The peer closed the connection.
    Disconnected { released_calls: usize },
}

/// Records connection events for assertions.
#[derive(Debug, Default)]
pub struct RecordingBusReporter {
    events: RefCell<Vec<BusEvent>>,
}

impl RecordingBusReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<BusEvent> {
        self.events.borrow().clone()
    }

    /// Returns the texts of suppressed errors in the order they were dropped.
    #[must_use]
    pub fn suppressed(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                BusEvent::Suppressed(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: BusEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl BusReporter for RecordingBusReporter {
    fn message_sent(&self, message: &Message) {
        let label = message
            .member()
            .map_or_else(|| message.kind().to_string(), str::to_owned);
        self.record(BusEvent::Sent(label));
    }

    fn message_received(&self, _message: &Message) {}

    fn unmatched_reply(&self, message: &Message) {
        self.record(BusEvent::UnmatchedReply(
            message.reply_serial().unwrap_or_default(),
        ));
    }

    fn suppressed_error(&self, error: &BusError) {
        self.record(BusEvent::Suppressed(error.to_string()));
    }

    fn disconnected(&self, released_calls: usize) {
        self.record(BusEvent::Disconnected { released_calls });
    }
}
