//! Transport seam for Packetforge.
//!
//! The socket layer is an external collaborator of the packet pipeline.
//! This crate pins down the three things the pipeline needs from it:
//!
//! - [`ConnectionId`]: which connection a chunk of bytes belongs to.
//! - [`Transport`] / [`Connection`]: accept connections and read raw
//!   byte chunks from them.
//! - [`Transmit`]: hand an encoded frame back for delivery.
//!
//! # Feature Flags
//!
//! - `tcp` (default): stream transport over `tokio::net::TcpListener`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::TransportError;
#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that delivers raw byte chunks.
///
/// Chunks carry no framing guarantees: a chunk may hold half a frame,
/// several frames, or the tail of one frame and the head of the next.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends data to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next chunk of bytes from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

/// Accepts encoded bytes for delivery to a connection.
///
/// This is the send half of the transport as seen by the packet
/// pipeline. It is synchronous so it can be called from logic threads
/// that do not run inside an async runtime; implementations queue the
/// bytes and deliver them from their own I/O tasks.
pub trait Transmit: Send + Sync + 'static {
    /// Queues `data` for delivery to connection `id`.
    fn transmit(&self, id: ConnectionId, data: Vec<u8>) -> Result<(), TransportError>;

    /// Returns every connection currently able to receive data.
    fn connections(&self) -> Vec<ConnectionId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_orders_by_raw_value() {
        let mut ids = vec![ConnectionId::new(3), ConnectionId::new(1), ConnectionId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![ConnectionId::new(1), ConnectionId::new(2), ConnectionId::new(3)]);
    }

    #[test]
    fn test_unknown_connection_error_names_the_id() {
        let err = TransportError::UnknownConnection(ConnectionId::new(9));
        assert_eq!(err.to_string(), "unknown connection conn-9");
    }
}
