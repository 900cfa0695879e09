//! Outbound side of every connection.
//!
//! Logic threads are plain OS threads, so they cannot await a socket
//! write. Instead each live connection registers an unbounded channel
//! here; [`Transmit::transmit`] pushes encoded frames into it and the
//! connection's writer task drains it onto the socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use packetforge_transport::{ConnectionId, Transmit, TransportError};
use tokio::sync::mpsc;

type Senders = HashMap<ConnectionId, mpsc::UnboundedSender<Vec<u8>>>;

/// Registry of per-connection send queues. Cheap to clone.
#[derive(Clone, Default)]
pub struct Outbox {
    senders: Arc<Mutex<Senders>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a send queue for `id` and returns its receiving end.
    ///
    /// Registering an id twice replaces the old queue; its receiver sees
    /// the channel close.
    pub fn register(&self, id: ConnectionId) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.lock().insert(id, tx).is_some() {
            tracing::warn!(%id, "connection registered twice, replacing send queue");
        }
        rx
    }

    /// Closes the send queue for `id`. Frames already queued are still
    /// delivered by the writer. Returns `false` if `id` was not
    /// registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Senders> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transmit for Outbox {
    fn transmit(&self, id: ConnectionId, data: Vec<u8>) -> Result<(), TransportError> {
        let senders = self.lock();
        let tx = senders
            .get(&id)
            .ok_or(TransportError::UnknownConnection(id))?;
        tx.send(data)
            .map_err(|_| TransportError::ConnectionClosed(format!("writer for {id} stopped")))
    }

    fn connections(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("connections", &self.len())
            .finish()
    }
}
