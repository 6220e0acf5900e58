//! Application layer for the booking context.

pub mod command_handlers;
pub mod query_handlers;
pub mod refund_queue;
