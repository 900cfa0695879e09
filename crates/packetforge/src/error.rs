//! Unified error type for the Packetforge engine.

use packetforge_dispatch::DispatchError;
use packetforge_protocol::ProtocolError;
use packetforge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `packetforge` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PacketforgeError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, transforms, serialization).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A dispatch-level error (closed queue, logic worker failure).
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The dispatch queue was closed while a connection was still
    /// delivering packets.
    #[error("engine is shutting down")]
    Shutdown,

    /// Engine configuration could not be parsed.
    #[error("invalid engine configuration: {0}")]
    Config(#[source] serde_json::Error),

    /// A background task panicked or was cancelled.
    #[error("engine task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PacketforgeError {
    /// Returns `true` if the connection that produced this error has to
    /// be closed.
    ///
    /// Only resource-level protocol errors (full transfer buffer, empty
    /// packet pool) leave the connection usable.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_fatal(),
            _ => true,
        }
    }
}
