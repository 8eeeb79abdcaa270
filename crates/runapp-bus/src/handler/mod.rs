//! Handlers and the registry that owns them while they are attached.
//!
//! A [`Handler`] is created by a connection and must be attached to that
//! same connection, either as the one-shot reply handler of a method call,
//! as a persistent signal subscription, or as the implementation of an
//! exported method. Once attached the registry owns
//! it; one-shot handlers are dropped right after their single invocation
//! and persistent ones live as long as the connection.

mod match_rule;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{CallbackError, PreconditionError};
use crate::message::Message;

pub use match_rule::MatchRule;
pub(crate) use match_rule::MethodRoute;

/// Callback run when a handler fires.
///
/// The message is handed over with its read cursor at the start of the
/// body. An `Err` is captured by the connection and returned from the next
/// `drive` call.
pub type Callback = Box<dyn FnMut(&mut Message) -> Result<(), CallbackError>>;

/// Identity of one connection, used to check handler ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Whether a handler fires once or for every matching message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fires for the single reply to one method call, then is released.
    OneShot,
    /// Fires for every matching signal or method call until the connection
    /// goes away.
    Persistent,
}

/// Callback bound to the connection that created it.
pub struct Handler {
    owner: ConnectionId,
    callback: Callback,
}

impl Handler {
    pub(crate) fn new<F>(owner: ConnectionId, callback: F) -> Self
    where
        F: FnMut(&mut Message) -> Result<(), CallbackError> + 'static,
    {
        Self {
            owner,
            callback: Box::new(callback),
        }
    }

    /// Returns the connection that created the handler.
    #[must_use]
    pub const fn owner(&self) -> ConnectionId {
        self.owner
    }

    /// Returns `true` when the handler was created by `connection`.
    #[must_use]
    pub fn belongs_to(&self, connection: ConnectionId) -> bool {
        self.owner == connection
    }

    pub(crate) fn check_owner(&self, connection: ConnectionId) -> Result<(), PreconditionError> {
        if self.belongs_to(connection) {
            Ok(())
        } else {
            Err(PreconditionError::ForeignHandler {
                owner: self.owner.get(),
                connection: connection.get(),
            })
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Handler")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Registry key of an attached handler; ids grow in attachment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// What an attached handler waits for.
pub(crate) enum Route {
    Reply(u32),
    Signal(MatchRule),
    Method(MethodRoute),
}

/// Who is waiting for the reply to an outstanding call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingReply {
    Handler(HandlerId),
    /// A call the connection issued for its own bookkeeping.
    Internal(&'static str),
}

struct Slot {
    callback: Callback,
    disposition: Disposition,
    route: Route,
}

/// Attached handlers keyed by id, plus the outstanding-call table.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    slots: BTreeMap<HandlerId, Slot>,
    replies: HashMap<u32, PendingReply>,
    next_id: u64,
}

impl HandlerRegistry {
    pub(crate) fn attach(&mut self, handler: Handler, route: Route) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        let disposition = match route {
            Route::Reply(serial) => {
                self.replies.insert(serial, PendingReply::Handler(id));
                Disposition::OneShot
            }
            Route::Signal(_) | Route::Method(_) => Disposition::Persistent,
        };
        self.slots.insert(
            id,
            Slot {
                callback: handler.callback,
                disposition,
                route,
            },
        );
        id
    }

    pub(crate) fn expect_internal_reply(&mut self, serial: u32, operation: &'static str) {
        self.replies.insert(serial, PendingReply::Internal(operation));
    }

    /// Removes and returns whoever waits for the reply to `serial`.
    pub(crate) fn take_reply(&mut self, serial: u32) -> Option<PendingReply> {
        self.replies.remove(&serial)
    }

    /// Persistent handlers whose rule matches `message`, in attachment order.
    pub(crate) fn signal_handlers(&self, message: &Message) -> Vec<HandlerId> {
        self.slots
            .iter()
            .filter(|(_, slot)| matches!(&slot.route, Route::Signal(rule) if rule.matches(message)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// The earliest attached handler exporting the method `message` calls.
    pub(crate) fn method_handler(&self, message: &Message) -> Option<HandlerId> {
        self.slots
            .iter()
            .find(|(_, slot)| matches!(&slot.route, Route::Method(route) if route.matches(message)))
            .map(|(id, _)| *id)
    }

    /// Runs the handler, releasing it afterwards when it is one-shot.
    ///
    /// Returns `None` when no handler is attached under `id`.
    pub(crate) fn invoke(
        &mut self,
        id: HandlerId,
        message: &mut Message,
    ) -> Option<Result<(), CallbackError>> {
        let slot = self.slots.get_mut(&id)?;
        let outcome = (slot.callback)(message);
        if slot.disposition == Disposition::OneShot {
            self.slots.remove(&id);
        }
        Some(outcome)
    }

    /// Drops a handler without running it.
    pub(crate) fn release(&mut self, id: HandlerId) -> bool {
        self.slots.remove(&id).is_some()
    }

    /// Drops every one-shot handler still waiting for a reply, unfired.
    pub(crate) fn release_pending_replies(&mut self) -> usize {
        let pending: Vec<HandlerId> = self
            .replies
            .drain()
            .filter_map(|(_, pending)| match pending {
                PendingReply::Handler(id) => Some(id),
                PendingReply::Internal(_) => None,
            })
            .collect();
        pending.into_iter().filter(|id| self.release(*id)).count()
    }

    /// Drops every handler.
    pub(crate) fn clear(&mut self) -> usize {
        let released = self.slots.len();
        self.slots.clear();
        self.replies.clear();
        released
    }

    #[cfg(test)]
    pub(crate) fn disposition(&self, id: HandlerId) -> Option<Disposition> {
        self.slots.get(&id).map(|slot| slot.disposition)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn pending_replies(&self) -> usize {
        self.replies.len()
    }
}
