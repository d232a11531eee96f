//! Helpers for integration tests that need a live PostgreSQL server.
//!
//! The suite is opt-in: tests skip silently unless `TEST_DATABASE_HOST` is
//! set. Each test gets its own scratch database so concurrent tests cannot
//! interfere through the shared `schema_migrations` table.

#![allow(dead_code)]

use std::path::Path;

use shipyard_db::{sqlx, Backend, DatabaseConfig, DatabaseRegistry, DbHandle, DEFAULT_ALIAS};
use uuid::Uuid;

const ADMIN_ALIAS: &str = "admin";

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn test_config(database: &str) -> Option<DatabaseConfig> {
    let host = std::env::var("TEST_DATABASE_HOST").ok()?;
    Some(DatabaseConfig {
        backend: Backend::Postgres,
        host,
        port: env_or("TEST_DATABASE_PORT", "5432").parse().unwrap(),
        username: env_or("TEST_DATABASE_USERNAME", "postgres"),
        password: env_or("TEST_DATABASE_PASSWORD", "password"),
        database: database.to_string(),
        ssl_mode: env_or("TEST_DATABASE_SSLMODE", "disable"),
        max_idle_conns: 2,
        max_open_conns: 5,
    })
}

/// A scratch database plus registries pointing at it. Call
/// [`TestDb::cleanup`] at the end of the test; scratch databases are cheap
/// but not free.
pub struct TestDb {
    pub registry: DatabaseRegistry,
    admin: DatabaseRegistry,
    name: String,
}

impl TestDb {
    /// Returns `None` when no test server is configured.
    pub async fn create() -> Option<Self> {
        let admin_config = test_config("postgres")?;
        let name = format!("shipyard_test_{}", Uuid::new_v4().simple());

        let mut admin = DatabaseRegistry::new();
        admin
            .register(&admin_config, Some(ADMIN_ALIAS))
            .await
            .expect("admin database must be reachable");
        sqlx::raw_sql(&format!("CREATE DATABASE {name}"))
            .execute(admin.get(ADMIN_ALIAS).unwrap().pool())
            .await
            .expect("failed to create scratch database");

        let config = test_config(&name)?;
        let mut registry = DatabaseRegistry::new();
        registry.register(&config, None).await.unwrap();

        Some(Self {
            registry,
            admin,
            name,
        })
    }

    pub fn handle(&self) -> &DbHandle {
        self.registry.get(DEFAULT_ALIAS).unwrap()
    }

    /// A second, independent registration against the same scratch database,
    /// standing in for another process racing on startup.
    pub async fn second_handle(&self) -> DatabaseRegistry {
        let config = test_config(&self.name).unwrap();
        let mut registry = DatabaseRegistry::new();
        registry.register(&config, None).await.unwrap();
        registry
    }

    pub async fn cleanup(self) {
        self.handle().pool().close().await;
        let admin = self.admin.get(ADMIN_ALIAS).unwrap();
        // Best effort; a leaked scratch database is a nuisance, not a failure.
        let _ = sqlx::raw_sql(&format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", self.name))
            .execute(admin.pool())
            .await;
        admin.pool().close().await;
    }
}

/// Writes `{version}_{name}.up.sql` scripts into `dir`.
pub fn write_up_scripts(dir: &Path, scripts: &[(i64, &str, &str)]) {
    for (version, name, sql) in scripts {
        std::fs::write(dir.join(format!("{version}_{name}.up.sql")), sql).unwrap();
    }
}

/// Writes `{version}_{name}.down.sql` scripts into `dir`.
pub fn write_down_scripts(dir: &Path, scripts: &[(i64, &str, &str)]) {
    for (version, name, sql) in scripts {
        std::fs::write(dir.join(format!("{version}_{name}.down.sql")), sql).unwrap();
    }
}
