//! Domain layer for group matching.

pub mod selection;
