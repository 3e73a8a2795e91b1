//! WebSocket frame pumps.
//!
//! [`process_messages`] reads frames and feeds text to the
//! [`Connection`]; [`forward_outbound`] writes queued request frames to the
//! socket. Whichever side stops first shuts the connection down. There is
//! no reconnect: losing the store is fatal to the runner.

use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::connection::Connection;

/// Read frames until the socket closes or errors, then shut the
/// connection down.
pub async fn process_messages<S>(mut stream: S, conn: Arc<Connection>)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                conn.dispatch_text(&text);
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!("Ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "Store closed WebSocket");
                break "closed by peer";
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "WebSocket receive error");
                break "receive error";
            }
            None => break "stream ended",
        }
    };

    conn.shutdown(reason);
}

/// Write outbound frames until the channel closes, the socket fails, or
/// the connection is shut down.
pub async fn forward_outbound<S>(
    mut sink: S,
    mut outbound: mpsc::UnboundedReceiver<String>,
    conn: Arc<Connection>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let closed = conn.closed_token();

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    tracing::error!(error = %e, "WebSocket send error");
                    conn.shutdown("send error");
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}
