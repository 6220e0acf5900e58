//! Wayfare — capacity-constrained group matching.
//!
//! Selects which pending bookings for one departure travel together
//! without exceeding the seat cap, and serializes those selections per
//! departure so concurrent callers never see overlapping computations.

pub mod application;
pub mod domain;
