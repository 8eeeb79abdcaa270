//! Test suites for the bus engine.

mod behaviour;
pub(crate) mod support;
