//! # elif-migrate: Migration History Reconciliation for elif.rs
//!
//! Repairs the migration history ledger after a migration failed part way
//! through: the operator fixes the schema by hand and then marks the failed
//! migration as applied, or marks it rolled back so it can be re-attempted.
//!
//! Supports PostgreSQL, CockroachDB, MySQL and SQLite through `sqlx`, plus an
//! in-memory ledger for tests.

pub mod backends;
pub mod config;
pub mod error;
pub mod migrations;

pub use backends::{
    connect, ConnectionInfo, DatabaseBackendType, InMemoryHistory, MigrationHistoryBackend,
};
pub use config::*;
pub use error::*;
pub use migrations::*;
