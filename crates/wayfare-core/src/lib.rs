//! Wayfare Core — shared domain abstractions.
//!
//! This crate defines the traits and types the booking and matching
//! contexts depend on: the error taxonomy, the event envelope, the caller
//! credential, and the ports to the external catalog and payment gateway.
//! It contains no infrastructure code.

pub mod aggregate;
pub mod catalog;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod gateway;
pub mod identity;
pub mod lifecycle;
