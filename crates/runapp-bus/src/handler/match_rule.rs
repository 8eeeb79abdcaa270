//! Filters routing inbound signals and method calls to handlers.

use std::fmt;

use crate::error::EncodingError;
use crate::message::names;
use crate::message::{Message, MessageKind, ObjectPath};

/// Filter selecting which signals reach a subscription.
///
/// Interface and member must match exactly; sender and path match anything
/// when omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    sender: Option<String>,
    path: Option<ObjectPath>,
    interface: String,
    member: String,
}

impl MatchRule {
    /// Builds a signal rule.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodingError`] when the sender, interface or member is
    /// not a valid bus name, or `path` is not a valid object path.
    pub fn signal(
        sender: Option<&str>,
        path: Option<&str>,
        interface: &str,
        member: &str,
    ) -> Result<Self, EncodingError> {
        Ok(Self {
            sender: sender.map(names::bus_name).transpose()?,
            path: path.map(ObjectPath::new).transpose()?,
            interface: names::interface(interface)?,
            member: names::member(member)?,
        })
    }

    /// Returns the sender filter.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Returns the interface the rule selects.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Returns the member the rule selects.
    #[must_use]
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Returns `true` for rules on signals the connection synthesises
    /// itself, which the bus never needs to hear about.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.sender.as_deref() == Some(crate::LOCAL_INTERFACE)
            || self.interface == crate::LOCAL_INTERFACE
    }

    /// Returns `true` when `message` is a signal this rule selects.
    ///
    /// A well-known sender filter also accepts unique-name senders, since
    /// the bus stamps signals with the unique name of the emitting owner.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        if message.kind() != MessageKind::Signal
            || message.interface() != Some(self.interface.as_str())
            || message.member() != Some(self.member.as_str())
        {
            return false;
        }
        if let Some(path) = &self.path
            && message.path() != Some(path)
        {
            return false;
        }
        match (&self.sender, message.sender()) {
            (None, _) => true,
            (Some(wanted), Some(actual)) if wanted == actual => true,
            (Some(wanted), Some(actual)) => {
                !wanted.starts_with(':')
                    && actual.starts_with(':')
                    && wanted.as_str() != crate::LOCAL_INTERFACE
            }
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for MatchRule {
    /// Formats the rule in the bus's `AddMatch` syntax.
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("type='signal'")?;
        if let Some(sender) = &self.sender {
            write!(formatter, ",sender='{sender}'")?;
        }
        if let Some(path) = &self.path {
            write!(formatter, ",path='{path}'")?;
        }
        write!(
            formatter,
            ",interface='{}',member='{}'",
            self.interface, self.member
        )
    }
}

/// Object, interface and member an exported method answers for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MethodRoute {
    path: ObjectPath,
    interface: String,
    member: String,
}

impl MethodRoute {
    pub(crate) fn new(path: &str, interface: &str, member: &str) -> Result<Self, EncodingError> {
        Ok(Self {
            path: ObjectPath::new(path)?,
            interface: names::interface(interface)?,
            member: names::member(member)?,
        })
    }

    /// Returns `true` when `message` calls this method.
    ///
    /// Calls without an interface header match on path and member alone.
    pub(crate) fn matches(&self, message: &Message) -> bool {
        message.kind() == MessageKind::MethodCall
            && message.path() == Some(&self.path)
            && message.member() == Some(self.member.as_str())
            && message
                .interface()
                .is_none_or(|interface| interface == self.interface)
    }
}

impl fmt::Display for MethodRoute {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}.{}", self.path, self.interface, self.member)
    }
}
