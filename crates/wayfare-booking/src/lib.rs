//! Wayfare — booking and payment lifecycle.
//!
//! Owns the Booking/Payment records, the state machine that is their only
//! mutator, the ledger-store contract they are persisted through, and the
//! retry queue that drives blocked refunds to completion.

pub mod application;
pub mod domain;
pub mod gateway;
pub mod ledger;
