//! Shared test doubles for the Wayfare booking core.

mod catalog;
mod clock;
mod gateway;

pub use catalog::InMemoryCatalog;
pub use clock::{FixedClock, SteppingClock};
pub use gateway::ScriptedGateway;
