use std::time::Duration;

use objwatch_client::ClientError;
use objwatch_core::error::CoreError;

/// Why a listener session could not be started.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The listener entity's value is not `{pattern, code}`.
    #[error(transparent)]
    InvalidListener(#[from] CoreError),

    /// The store refused (or never answered) the subscription.
    #[error("Failed to subscribe to '{pattern}': {source}")]
    Subscribe {
        pattern: String,
        #[source]
        source: ClientError,
    },
}

/// Fatal agent errors. Each one ends the process with exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("usage: objwatch-agent <store-url>")]
    Usage,

    #[error("Failed to connect to store: {0}")]
    Connect(#[source] ClientError),

    #[error("Failed to subscribe to listeners: {0}")]
    ListenerQuery(#[source] ClientError),

    #[error("Listener subscription ended")]
    ListenerQueryEnded,

    #[error("Store did not answer ping within {0:?}")]
    LivenessTimeout(Duration),

    #[error("Store connection lost")]
    ConnectionLost,
}
