//! Application layer for group matching.

pub mod engine;
pub mod orchestrator;
