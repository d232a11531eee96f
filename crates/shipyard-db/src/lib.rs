//! Database bootstrap and schema migration for shipyard services.
//!
//! The pieces fit together in one fixed order at process startup:
//!
//! 1. [`DatabaseConfig::from_env`] resolves the backend and connection
//!    parameters once; the config is read-only afterwards.
//! 2. [`DatabaseRegistry::register`] waits for the database to accept TCP
//!    connections, then opens a bounded connection pool under an alias.
//! 3. [`MigrationRunner`] takes the registered handle and a freshly loaded
//!    [`MigrationSource`], acquires the database-scoped migration lock, and
//!    applies whatever scripts are still pending.
//!
//! Several replicas of a service (or repeated runs of the one-shot migrator)
//! may start against the same database at once; the migration lock is the
//! only serialization between them, and losing the race surfaces as
//! [`DbError::LockTimeout`] rather than a hard failure.

pub mod config;
pub mod dialect;
pub mod error;
pub mod migrate;
pub mod probe;
pub mod registry;
pub mod setup;

pub use config::DatabaseConfig;
pub use dialect::Backend;
pub use error::DbError;
pub use migrate::{MigrationOutcome, MigrationRunner, MigrationSource, MigrationState};
pub use registry::{DatabaseRegistry, DbHandle, DEFAULT_ALIAS};

pub use sqlx;

/// Library-wide result alias.
pub type Result<T, E = DbError> = std::result::Result<T, E>;
