//! Connection readiness probing.
//!
//! In orchestrated deployments the database and its dependents start
//! concurrently, so the database is not guaranteed to accept connections the
//! moment this process does. Probing before driver registration keeps "the
//! database is not up yet" distinguishable from real registration failures.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::error::DbError;
use crate::Result;

/// Repeatedly attempts a TCP connection to `addr`, waiting `interval`
/// between attempts. Each attempt is also capped at `interval` so a
/// black-holed host cannot stall the loop. The delay is fixed; total wait is
/// roughly `retries * interval`.
pub async fn probe(addr: &str, retries: u32, interval: Duration) -> Result<()> {
    for attempt in 1..=retries {
        match timeout(interval, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                tracing::debug!(addr, attempt, "database is accepting connections");
                return Ok(());
            }
            Ok(Err(err)) => {
                tracing::debug!(addr, attempt, retries, error = %err, "connection attempt failed");
            }
            Err(_elapsed) => {
                tracing::debug!(addr, attempt, retries, "connection attempt timed out");
            }
        }
        sleep(interval).await;
    }

    Err(DbError::ConnectionUnreachable {
        addr: addr.to_string(),
        attempts: retries,
    })
}
