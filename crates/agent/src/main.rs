//! `objwatch-agent` -- runs listener scripts against an objtalk store.
//!
//! Connects to the store, watches the listener objects, and runs each
//! listener's Lua handlers as the objects it watches change. Losing the
//! store connection is fatal.
//!
//! ```text
//! objwatch-agent <store-url>
//! ```
//!
//! # Environment variables
//!
//! | Variable             | Required | Default      | Description                          |
//! |----------------------|----------|--------------|--------------------------------------|
//! | `LISTENER_PATTERN`   | no       | `listener/*` | Pattern selecting listener objects   |
//! | `PING_INTERVAL_SECS` | no       | `10`         | Seconds between liveness pings       |
//! | `PING_TIMEOUT_SECS`  | no       | `5`          | Seconds before a ping counts as lost |
//! | `RUST_LOG`           | no       | see below    | `tracing` filter                     |

use objwatch_agent::config::AgentConfig;
use objwatch_agent::error::AgentError;
use objwatch_agent::liveness;
use objwatch_agent::orchestrator::Orchestrator;
use objwatch_client::StoreClient;
use tokio::task::LocalSet;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "objwatch_agent=info,objwatch_client=info,objwatch_sandbox=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AgentConfig::from_args_and_env(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        store_url = %config.store_url,
        listener_pattern = %config.listener_pattern,
        ping_interval_secs = config.ping_interval.as_secs(),
        ping_timeout_secs = config.ping_timeout.as_secs(),
        "Starting objwatch-agent",
    );

    let err = LocalSet::new().run_until(run(config)).await;
    tracing::error!(error = %err, "objwatch-agent stopped");
    std::process::exit(1);
}

/// Run until something fatal happens.
async fn run(config: AgentConfig) -> AgentError {
    let conn = match StoreClient::new(&config.store_url).connect().await {
        Ok(conn) => conn,
        Err(e) => return AgentError::Connect(e),
    };
    let closed = conn.closed_token();

    let orchestrator = Orchestrator::new(conn.clone(), config.listener_pattern.clone());
    let pinger = liveness::run(conn, config.ping_interval, config.ping_timeout);

    tokio::select! {
        _ = closed.cancelled() => AgentError::ConnectionLost,
        err = pinger => err,
        err = orchestrator.run() => err,
    }
}
