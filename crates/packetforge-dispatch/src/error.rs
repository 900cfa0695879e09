//! Error types for the dispatch layer.

use crate::Packet;

/// Errors that can occur while queueing or running logic workers.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The queue has been shut down. The rejected packet is handed back
    /// so the caller can release it.
    #[error("dispatch queue is closed; {} packet rejected", .0.category())]
    Closed(Box<Packet>),

    /// The OS refused to start a logic thread.
    #[error("failed to spawn logic worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// A logic worker panicked inside the packet handler.
    #[error("logic worker {0} panicked")]
    WorkerPanicked(usize),
}

impl DispatchError {
    /// Takes back the packet a closed queue refused, if any.
    pub fn into_packet(self) -> Option<Packet> {
        match self {
            Self::Closed(packet) => Some(*packet),
            _ => None,
        }
    }
}
