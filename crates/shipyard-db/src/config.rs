//! Database configuration.
//!
//! Loaded once at startup from `DATABASE_*` environment variables (the env
//! rendering of the `database.*` configuration keys) and read-only
//! thereafter. Unset keys fall back to the same defaults the standalone
//! migrator has always shipped with.

use std::fmt;
use std::str::FromStr;

use crate::dialect::Backend;
use crate::error::DbError;
use crate::Result;

pub const ENV_DATABASE_TYPE: &str = "DATABASE_TYPE";
pub const ENV_DATABASE_HOST: &str = "DATABASE_HOST";
pub const ENV_DATABASE_PORT: &str = "DATABASE_PORT";
pub const ENV_DATABASE_USERNAME: &str = "DATABASE_USERNAME";
pub const ENV_DATABASE_PASSWORD: &str = "DATABASE_PASSWORD";
pub const ENV_DATABASE_DBNAME: &str = "DATABASE_DBNAME";
pub const ENV_DATABASE_SSLMODE: &str = "DATABASE_SSLMODE";
pub const ENV_DATABASE_MAX_IDLE_CONNS: &str = "DATABASE_MAX_IDLE_CONNS";
pub const ENV_DATABASE_MAX_OPEN_CONNS: &str = "DATABASE_MAX_OPEN_CONNS";

/// Connection parameters for one database backend.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Postgres `sslmode` value; carried but unused for MySQL.
    pub ssl_mode: String,
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
}

impl DatabaseConfig {
    /// Builds the configuration from the environment.
    ///
    /// `DATABASE_TYPE` is resolved first (empty or unset means Postgres)
    /// because the port and username defaults follow the backend.
    pub fn from_env() -> Result<Self> {
        let backend = Backend::from_str(&env_or(ENV_DATABASE_TYPE, ""))?;

        let default_user = match backend {
            Backend::Postgres => "postgres",
            Backend::MySql => "root",
        };

        Ok(Self {
            backend,
            host: env_or(ENV_DATABASE_HOST, "localhost"),
            port: env_parse(ENV_DATABASE_PORT)?.unwrap_or_else(|| backend.default_port()),
            username: env_or(ENV_DATABASE_USERNAME, default_user),
            password: env_or(ENV_DATABASE_PASSWORD, "password"),
            database: env_or(ENV_DATABASE_DBNAME, "registry"),
            ssl_mode: env_or(ENV_DATABASE_SSLMODE, "disable"),
            max_idle_conns: env_parse(ENV_DATABASE_MAX_IDLE_CONNS)?.unwrap_or(5),
            max_open_conns: env_parse(ENV_DATABASE_MAX_OPEN_CONNS)?.unwrap_or(5),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credential-redacted connection summary, safe to log.
impl fmt::Display for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend {
            Backend::Postgres => write!(
                f,
                "postgres://{}@{}:{}/{}?sslmode={}",
                self.username, self.host, self.port, self.database, self.ssl_mode,
            ),
            Backend::MySql => write!(
                f,
                "mysql://{}@{}:{}/{}",
                self.username, self.host, self.port, self.database,
            ),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map(Some)
            .map_err(|_| DbError::InvalidConfig { key, value }),
        _ => Ok(None),
    }
}
