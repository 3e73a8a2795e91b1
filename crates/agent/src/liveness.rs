use std::sync::Arc;
use std::time::Duration;

use objwatch_client::{ClientError, Connection};
use objwatch_core::protocol::PING_PATTERN;

use crate::error::AgentError;

/// Ping the store with `get("ping")` every `interval`.
///
/// Returns (never `Ok`) as soon as a ping goes unanswered for `timeout`
/// or the connection is gone. A rejected ping still proves the store is
/// alive.
pub async fn run(conn: Arc<Connection>, interval: Duration, timeout: Duration) -> AgentError {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match tokio::time::timeout(timeout, conn.get(PING_PATTERN)).await {
            Ok(Ok(_)) => {
                tracing::trace!("Store ping answered");
            }
            Ok(Err(ClientError::Disconnected)) => return AgentError::ConnectionLost,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Store ping rejected");
            }
            Err(_) => {
                tracing::error!(timeout_secs = timeout.as_secs(), "Store ping timed out");
                return AgentError::LivenessTimeout(timeout);
            }
        }
    }
}
