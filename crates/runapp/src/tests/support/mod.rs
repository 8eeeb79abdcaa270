//! Test harness utilities shared by the launcher's unit tests and the
//! behavioural suite.

mod bus;
mod world;

pub use bus::{JOB_PATH, StartOutcome, script_systemd};
pub use world::{TestWorld, world};
