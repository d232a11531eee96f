//! Database registry.
//!
//! Owns the live connection pools, one per alias. The registry is an
//! explicit object handed to whoever needs a handle; there is no
//! process-wide singleton to reach into.

use std::collections::HashMap;
use std::sync::Once;
use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::config::DatabaseConfig;
use crate::dialect::Backend;
use crate::error::DbError;
use crate::probe;
use crate::Result;

pub const DEFAULT_ALIAS: &str = "default";

/// Readiness probe budget used during registration: 30 attempts, 2 seconds
/// apart, matching the original bootstrap's 60-second window.
const PROBE_RETRIES: u32 = 30;
const PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// Connections are recycled after five minutes so pools behind load
/// balancers do not accumulate stale sockets.
const MAX_CONN_LIFETIME: Duration = Duration::from_secs(300);

static INSTALL_DRIVERS: Once = Once::new();

/// A registered, live database: the pool plus the backend it speaks.
#[derive(Debug, Clone)]
pub struct DbHandle {
    alias: String,
    backend: Backend,
    pool: AnyPool,
}

impl DbHandle {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

/// Alias → handle registry. At most one live handle per alias; registering
/// the same alias twice is a programming error and fails loudly.
#[derive(Debug, Default)]
pub struct DatabaseRegistry {
    handles: HashMap<String, DbHandle>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probes the database, opens a pool with the configured limits, and
    /// binds it under `alias` (default `"default"`).
    ///
    /// The probe runs first so that "not reachable yet" surfaces as
    /// [`DbError::ConnectionUnreachable`] instead of an opaque pool error.
    pub async fn register(&mut self, config: &DatabaseConfig, alias: Option<&str>) -> Result<()> {
        let alias = alias.unwrap_or(DEFAULT_ALIAS);
        if self.handles.contains_key(alias) {
            return Err(DbError::DuplicateAlias(alias.to_string()));
        }

        probe::probe(&config.addr(), PROBE_RETRIES, PROBE_INTERVAL).await?;

        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let pool = AnyPoolOptions::new()
            .min_connections(config.max_idle_conns)
            .max_connections(config.max_open_conns)
            .max_lifetime(MAX_CONN_LIFETIME)
            .connect(&config.backend.connect_url(config))
            .await?;

        tracing::info!(
            alias,
            backend = %config.backend,
            db = %config,
            "registered database"
        );

        self.handles.insert(
            alias.to_string(),
            DbHandle {
                alias: alias.to_string(),
                backend: config.backend,
                pool,
            },
        );
        Ok(())
    }

    pub fn get(&self, alias: &str) -> Result<&DbHandle> {
        self.handles
            .get(alias)
            .ok_or_else(|| DbError::NotRegistered(alias.to_string()))
    }
}
