//! Wayfare — PostgreSQL-backed booking ledger.

pub mod pg_ledger_store;
pub mod schema;
