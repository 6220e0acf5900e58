//! HTTP route definitions.

pub mod admin;
pub mod bookings;
pub mod health;
pub mod matching;
pub mod payments;
