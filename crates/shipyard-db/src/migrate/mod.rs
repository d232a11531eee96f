//! Schema migrations.
//!
//! Scripts live in a per-backend repository directory as raw SQL files named
//! `{version}_{name}.up.sql` / `{version}_{name}.down.sql`, where `version`
//! is a monotonically increasing integer. [`MigrationSource`] loads and
//! validates a script set; [`MigrationRunner`] applies it exactly once,
//! serialized across processes by a database-scoped lock.

mod runner;
mod source;

pub use runner::{MigrationOutcome, MigrationRunner, MigrationState};
pub use source::{Direction, MigrationScript, MigrationSource, SCRIPTS_PATH_ENV};
