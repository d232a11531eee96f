use std::path::PathBuf;

use thiserror::Error;

use crate::dialect::Backend;
use crate::migrate::Direction;

/// Error type for database bootstrap and migration operations.
///
/// `NoChange` is deliberately absent: an up-to-date schema is a successful
/// outcome (`MigrationOutcome::NoChange`), not an error. `LockTimeout` is the
/// one recoverable variant: another process is migrating right now and the
/// caller decides whether to retry or abort.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database unreachable at {addr} after {attempts} attempts")]
    ConnectionUnreachable { addr: String, attempts: u32 },

    #[error("unsupported database type: {0:?}")]
    UnsupportedBackend(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("database alias {0:?} is already registered")]
    DuplicateAlias(String),

    #[error("no database registered under alias {0:?}")]
    NotRegistered(String),

    #[error("another process holds the migration lock")]
    LockTimeout,

    #[error("backend {0} has no concurrent-safe migration lock")]
    LockUnsupported(Backend),

    #[error("schema is dirty at version {version}; manual repair required before migrating")]
    DirtySchema { version: i64 },

    #[error("duplicate migration version {version} ({direction})")]
    DuplicateVersion { version: i64, direction: Direction },

    #[error("no migration scripts found in {}", .0.display())]
    EmptySource(PathBuf),

    #[error("invalid migration filename: {0:?}")]
    InvalidFilename(String),

    #[error("no down script for version {0}")]
    MissingDownScript(i64),

    #[error("migration {version} ({name}) failed: {source}")]
    MigrationFailed {
        version: i64,
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
