//! Domain layer for the booking context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod records;
pub mod refunds;
