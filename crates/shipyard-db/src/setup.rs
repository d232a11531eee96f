//! Process-level tracing setup.

use color_eyre::eyre::Context as _;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer as _, Registry,
};

/// Sets up tracing with a stdout layer.
///
/// # Environment Variables
///
/// - `RUST_LOG`: log filter (defaults to `info,{crate_name}=debug`)
/// - `JSON_LOGS`: if set, outputs JSON logs instead of human-readable ones
pub fn setup_tracing(crate_name: &str) -> color_eyre::Result<()> {
    let rust_log =
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("info,{crate_name}=debug"));

    let env_filter = EnvFilter::builder()
        .parse(&rust_log)
        .wrap_err_with(|| color_eyre::eyre::eyre!("Couldn't create env filter from {}", rust_log))?;

    let stdout_layer = if std::env::var("JSON_LOGS").is_ok() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    Registry::default()
        .with(stdout_layer)
        .with(env_filter)
        .try_init()?;

    Ok(())
}
