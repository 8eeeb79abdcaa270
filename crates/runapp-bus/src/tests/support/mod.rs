//! Test harness utilities shared by the connection unit tests and the
//! behavioural suite.

mod peer;
mod reporter;
mod world;

pub use peer::{connected, job_removed, reply_with_path, start_unit_request};
pub use reporter::{BusEvent, RecordingBusReporter};
pub use world::{TestWorld, world};
