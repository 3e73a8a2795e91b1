//! WebSocket client for connecting to an objtalk store.
//!
//! [`StoreClient`] holds the endpoint. Call [`StoreClient::connect`] to
//! open the socket, spawn the frame pumps, and get a shared
//! [`Connection`].

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;

use crate::connection::Connection;
use crate::error::ClientError;
use crate::pump::{forward_outbound, process_messages};

/// Configuration handle for an objtalk store endpoint.
pub struct StoreClient {
    url: String,
}

impl StoreClient {
    /// * `url` - WebSocket URL, e.g. `ws://host:3000/objtalk`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Open the WebSocket and start the reader and writer tasks.
    ///
    /// The returned connection is live until the socket drops, at which
    /// point its [`closed_token`](Connection::closed_token) is cancelled.
    pub async fn connect(&self) -> Result<Arc<Connection>, ClientError> {
        let (ws_stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            ClientError::Connection(format!("Failed to connect to store at {}: {e}", self.url))
        })?;

        tracing::info!(url = %self.url, "Connected to store");

        let (sink, stream) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(outbound_tx));

        tokio::spawn(process_messages(stream, Arc::clone(&conn)));
        tokio::spawn(forward_outbound(sink, outbound_rx, Arc::clone(&conn)));

        Ok(conn)
    }
}
