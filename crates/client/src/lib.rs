//! objtalk store client.
//!
//! Provides typed wire messages, request/response correlation, live query
//! views, and the WebSocket plumbing that connects them to a store.

pub mod client;
pub mod connection;
pub mod error;
pub mod messages;
pub mod pump;
pub mod query;
pub mod rpc;

pub use client::StoreClient;
pub use connection::Connection;
pub use error::ClientError;
pub use messages::QueryId;
pub use query::{LiveQuery, QueryView, ViewEvent};
