//! One-shot schema migrator.
//!
//! Reads the database configuration from the environment, waits for the
//! database to come up, and applies pending migration scripts. Exits
//! non-zero on any fatal error; an already up-to-date schema and an empty
//! script repository are both successful outcomes, so the process is safe to
//! run on every deployment.

use color_eyre::eyre::{eyre, Context as _};
use shipyard_db::{
    setup::setup_tracing, DatabaseConfig, DatabaseRegistry, DbError, MigrationOutcome,
    MigrationRunner, MigrationSource, DEFAULT_ALIAS,
};
use tracing::{info, warn};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run())
}

async fn run() -> color_eyre::Result<()> {
    setup_tracing("shipyard_db_migrator")?;

    let config = DatabaseConfig::from_env().wrap_err("invalid database configuration")?;
    info!("Migrating the schema to the latest version");
    info!("DB info: {config}");

    let mut registry = DatabaseRegistry::new();
    registry
        .register(&config, None)
        .await
        .wrap_err("failed to initialize database")?;
    let handle = registry.get(DEFAULT_ALIAS)?;

    let path = MigrationSource::resolve_path(config.backend);
    let source = match MigrationSource::load(&path) {
        Ok(source) => source,
        Err(DbError::EmptySource(path)) => {
            warn!(path = %path.display(), "no migration scripts found, nothing to migrate");
            return Ok(());
        }
        Err(err) => return Err(err).wrap_err("failed to load migration scripts"),
    };

    let runner = MigrationRunner::new(handle);
    match runner.up(&source).await {
        Ok(MigrationOutcome::Applied { version }) => {
            info!(version, "Migration done, the schema is now up to date");
        }
        Ok(MigrationOutcome::NoChange) => info!("No change in schema, skip"),
        Err(DbError::LockTimeout) => {
            return Err(eyre!(
                "another process is migrating the schema; re-run once it finishes"
            ));
        }
        Err(err) => return Err(err).wrap_err("failed to migrate schema"),
    }

    Ok(())
}
