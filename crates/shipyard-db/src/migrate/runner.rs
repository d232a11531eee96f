use std::time::Duration;

use sqlx::any::AnyRow;
use sqlx::pool::PoolConnection;
use sqlx::{Any, Connection as _, Row};
use tokio::time::{sleep, Instant};

use crate::dialect::Backend;
use crate::error::DbError;
use crate::registry::DbHandle;
use crate::Result;

use super::source::{MigrationScript, MigrationSource};

/// How long a runner waits for the migration lock before reporting
/// [`DbError::LockTimeout`]. Losing the lock race is a normal outcome under
/// concurrent startup, not a systemic error.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Single-row schema version table, golang-migrate compatible shape. The
/// same DDL is valid on both backends.
const CREATE_STATE_TABLE_SQL: &str =
    "CREATE TABLE IF NOT EXISTS schema_migrations (version BIGINT NOT NULL PRIMARY KEY, dirty BOOLEAN NOT NULL)";

/// The persisted migration state: the current schema version and whether a
/// previous run failed partway through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationState {
    pub version: i64,
    pub dirty: bool,
}

/// Successful migration outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// At least one script was applied; the schema is now at `version`.
    Applied { version: i64 },
    /// Nothing was pending. Expected and common, since every process
    /// restart re-runs the migrator.
    NoChange,
}

/// Applies a [`MigrationSource`] to a registered database.
///
/// The whole run happens on one pooled connection: both the Postgres
/// advisory lock and the MySQL named lock are session-scoped, so lock,
/// state reads, script execution, and unlock must share a session. The lock
/// is released on every exit path of the run; if the process itself dies
/// mid-run the lock goes away with the session, but a half-applied script
/// leaves `dirty = true` behind, which deliberately requires an operator to
/// repair. Re-running a partially applied DDL script risks
/// double-application.
pub struct MigrationRunner<'a> {
    handle: &'a DbHandle,
    lock_timeout: Duration,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(handle: &'a DbHandle) -> Self {
        Self {
            handle,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Applies all pending up scripts in version order.
    pub async fn up(&self, source: &MigrationSource) -> Result<MigrationOutcome> {
        let mut conn = self.handle.pool().acquire().await?;
        self.lock(&mut conn).await?;
        let result = self.apply_up(&mut conn, source).await;
        self.unlock(&mut conn).await;
        result
    }

    /// Reverts the most recently applied version using its down script.
    pub async fn rollback(&self, source: &MigrationSource) -> Result<MigrationOutcome> {
        let mut conn = self.handle.pool().acquire().await?;
        self.lock(&mut conn).await?;
        let result = self.apply_rollback(&mut conn, source).await;
        self.unlock(&mut conn).await;
        result
    }

    /// Reads the persisted migration state, creating the state table if this
    /// database has never been migrated.
    pub async fn state(&self) -> Result<MigrationState> {
        let mut conn = self.handle.pool().acquire().await?;
        ensure_state_table(&mut conn).await?;
        read_state(&mut conn).await
    }

    async fn apply_up(
        &self,
        conn: &mut PoolConnection<Any>,
        source: &MigrationSource,
    ) -> Result<MigrationOutcome> {
        ensure_state_table(conn).await?;

        let state = read_state(conn).await?;
        if state.dirty {
            return Err(DbError::DirtySchema {
                version: state.version,
            });
        }

        let pending = pending(source.up(), state.version);
        if pending.is_empty() {
            tracing::info!(version = state.version, "no change in schema, skip");
            return Ok(MigrationOutcome::NoChange);
        }

        let mut applied = state.version;
        for script in pending {
            tracing::info!(
                version = script.version,
                name = %script.name,
                checksum = %script.checksum,
                "applying migration"
            );

            if let Err(err) = sqlx::raw_sql(&script.sql).execute(&mut **conn).await {
                // Record where the failure left us; the schema between
                // `applied` and `script.version` is in an unknown state.
                if let Err(state_err) = write_state(conn, applied, true).await {
                    tracing::error!(error = %state_err, "failed to record dirty schema state");
                }
                return Err(DbError::MigrationFailed {
                    version: script.version,
                    name: script.name.clone(),
                    source: err,
                });
            }
            applied = script.version;
        }

        write_state(conn, applied, false).await?;
        tracing::info!(version = applied, "schema migrated");
        Ok(MigrationOutcome::Applied { version: applied })
    }

    async fn apply_rollback(
        &self,
        conn: &mut PoolConnection<Any>,
        source: &MigrationSource,
    ) -> Result<MigrationOutcome> {
        ensure_state_table(conn).await?;

        let state = read_state(conn).await?;
        if state.dirty {
            return Err(DbError::DirtySchema {
                version: state.version,
            });
        }
        if state.version == 0 {
            tracing::info!("no migrations to roll back");
            return Ok(MigrationOutcome::NoChange);
        }

        let script = source
            .down_for(state.version)
            .ok_or(DbError::MissingDownScript(state.version))?;
        let previous = source
            .up()
            .iter()
            .map(|s| s.version)
            .filter(|&v| v < state.version)
            .max()
            .unwrap_or(0);

        tracing::info!(
            version = script.version,
            name = %script.name,
            "rolling back migration"
        );

        if let Err(err) = sqlx::raw_sql(&script.sql).execute(&mut **conn).await {
            if let Err(state_err) = write_state(conn, state.version, true).await {
                tracing::error!(error = %state_err, "failed to record dirty schema state");
            }
            return Err(DbError::MigrationFailed {
                version: script.version,
                name: script.name.clone(),
                source: err,
            });
        }

        write_state(conn, previous, false).await?;
        tracing::info!(version = previous, "rollback completed");
        Ok(MigrationOutcome::Applied { version: previous })
    }

    /// Bounded lock acquisition: poll the non-blocking primitive until
    /// granted or the timeout elapses. A backend without a concurrent-safe
    /// lock fails fast; racing unsynchronized is never acceptable.
    async fn lock(&self, conn: &mut PoolConnection<Any>) -> Result<()> {
        let backend = self.handle.backend();
        if !backend.supports_concurrent_lock() {
            return Err(DbError::LockUnsupported(backend));
        }

        let sql = backend.acquire_lock_sql();
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            let row = sqlx::query(&sql).fetch_one(&mut **conn).await?;
            if lock_granted(backend, &row)? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DbError::LockTimeout);
            }
            sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    /// Best-effort release; a failure here is logged rather than masking the
    /// result of the run itself.
    async fn unlock(&self, conn: &mut PoolConnection<Any>) {
        let backend = self.handle.backend();
        if !backend.supports_concurrent_lock() {
            return;
        }

        match sqlx::query(&backend.release_lock_sql())
            .fetch_one(&mut **conn)
            .await
        {
            Ok(row) => match lock_granted(backend, &row) {
                Ok(true) => tracing::debug!("migration lock released"),
                Ok(false) => tracing::warn!("migration lock was not held at release"),
                Err(err) => tracing::warn!(error = %err, "unreadable unlock result"),
            },
            Err(err) => tracing::warn!(error = %err, "failed to release migration lock"),
        }
    }
}

/// The subset of `scripts` still to be applied: version strictly greater
/// than `current`, preserving the source's ascending order.
fn pending(scripts: &[MigrationScript], current: i64) -> Vec<&MigrationScript> {
    scripts.iter().filter(|s| s.version > current).collect()
}

async fn ensure_state_table(conn: &mut PoolConnection<Any>) -> Result<()> {
    sqlx::raw_sql(CREATE_STATE_TABLE_SQL)
        .execute(&mut **conn)
        .await?;
    Ok(())
}

async fn read_state(conn: &mut PoolConnection<Any>) -> Result<MigrationState> {
    let row = sqlx::query("SELECT version, dirty FROM schema_migrations LIMIT 1")
        .fetch_optional(&mut **conn)
        .await?;

    match row {
        None => Ok(MigrationState {
            version: 0,
            dirty: false,
        }),
        Some(row) => Ok(MigrationState {
            version: get_i64(&row, 0)?,
            dirty: get_bool(&row, 1)?,
        }),
    }
}

/// Delete-then-insert keeps the table at exactly one row on both backends.
/// Both statements are plain DML, so they run in one transaction even on
/// MySQL: the state row either moves to the new version or stays at the old
/// one. A half-written state (no row at all) would read back as a fresh
/// database and defeat the dirty guard.
///
/// Values are integer/boolean literals, so no placeholder dialect is needed.
async fn write_state(conn: &mut PoolConnection<Any>, version: i64, dirty: bool) -> Result<()> {
    let dirty = if dirty { "TRUE" } else { "FALSE" };
    let mut tx = conn.begin().await?;
    sqlx::query("DELETE FROM schema_migrations")
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!(
        "INSERT INTO schema_migrations (version, dirty) VALUES ({version}, {dirty})"
    ))
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

fn lock_granted(backend: Backend, row: &AnyRow) -> Result<bool> {
    match backend {
        Backend::Postgres => Ok(row.try_get::<bool, _>(0)?),
        // GET_LOCK / RELEASE_LOCK return 1, 0, or NULL.
        Backend::MySql => Ok(row.try_get::<Option<i64>, _>(0)? == Some(1)),
    }
}

/// MySQL's Any driver may surface BIGINT columns with a narrower concrete
/// type; decode leniently.
fn get_i64(row: &AnyRow, index: usize) -> Result<i64> {
    row.try_get::<i64, _>(index)
        .or_else(|_| row.try_get::<i32, _>(index).map(i64::from))
        .map_err(DbError::Database)
}

/// `dirty` is BOOLEAN on Postgres and TINYINT(1) on MySQL.
fn get_bool(row: &AnyRow, index: usize) -> Result<bool> {
    row.try_get::<bool, _>(index)
        .or_else(|_| row.try_get::<i64, _>(index).map(|v| v != 0))
        .or_else(|_| row.try_get::<i32, _>(index).map(|v| v != 0))
        .map_err(DbError::Database)
}
