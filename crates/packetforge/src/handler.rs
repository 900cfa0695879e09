//! Per-connection handler: connect, receive loop, disconnect.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register a send queue and start the writer task.
//!   2. Push `Connect` onto the dispatch queue.
//!   3. Loop: receive a chunk → feed it through the connection's adapter.
//!   4. Push `Disconnect`, flush the writer, close the socket.

use std::sync::Arc;
use std::time::Duration;

use packetforge_dispatch::{DispatchQueue, Packet};
use packetforge_transport::{Connection, ConnectionId, TcpConnection};
use tokio::sync::mpsc;

use crate::adapter::ProtocolAdapter;
use crate::outbox::Outbox;
use crate::PacketforgeError;

/// How often a deferred chunk is retried before the connection is
/// given up on.
const MAX_RETRIES: u32 = 8;

/// Back-off before the first retry; doubles on each attempt.
const RETRY_DELAY: Duration = Duration::from_millis(2);

/// State shared by every connection task.
pub(crate) struct Shared {
    pub(crate) queue: DispatchQueue,
    pub(crate) outbox: Outbox,
    /// Adapter every connection's pipeline is cloned from.
    pub(crate) template: Arc<ProtocolAdapter>,
    pub(crate) recv_timeout: Option<Duration>,
}

/// Drop guard that retires a connection when the handler exits.
///
/// This ensures cleanup happens even if the task is aborted during
/// engine shutdown: the send queue is closed and the logic layer sees
/// a `Disconnect`.
struct ConnectionGuard {
    id: ConnectionId,
    shared: Arc<Shared>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.shared.outbox.unregister(self.id);
        if self
            .shared
            .queue
            .push(Packet::Disconnect { owner: self.id })
            .is_err()
        {
            tracing::debug!(id = %self.id, "queue closed, disconnect not delivered");
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(conn: TcpConnection, shared: Arc<Shared>) {
    let conn = Arc::new(conn);
    let id = conn.id();
    tracing::debug!(%id, peer = %conn.peer_addr(), "handling new connection");

    let rx = shared.outbox.register(id);
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), rx));

    if shared.queue.push(Packet::Connect { owner: id }).is_err() {
        tracing::debug!(%id, "queue closed, refusing connection");
        shared.outbox.unregister(id);
        let _ = writer.await;
        let _ = conn.close().await;
        return;
    }
    let guard = ConnectionGuard {
        id,
        shared: Arc::clone(&shared),
    };

    let mut adapter = shared.template.fresh();
    let outcome = read_loop(&conn, &mut adapter, &shared).await;
    match outcome {
        Ok(()) => tracing::info!(%id, "connection closed"),
        Err(e) => tracing::warn!(%id, error = %e, "dropping connection"),
    }

    // Guard drops → send queue closes, Disconnect is pushed.
    drop(guard);
    let _ = writer.await;
    if let Err(e) = conn.close().await {
        tracing::debug!(%id, error = %e, "close failed");
    }
}

/// Receives chunks until the peer closes, times out, or the stream
/// breaks.
async fn read_loop(
    conn: &TcpConnection,
    adapter: &mut ProtocolAdapter,
    shared: &Shared,
) -> Result<(), PacketforgeError> {
    let id = conn.id();
    loop {
        let received = match shared.recv_timeout {
            Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::info!(%id, timeout_secs = limit.as_secs(), "connection timed out");
                    return Ok(());
                }
            },
            None => conn.recv().await,
        };

        let Some(data) = received? else {
            return Ok(());
        };

        match adapter.on_receive(id, &data, &shared.queue) {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => retry_backlog(id, adapter, &shared.queue, e).await?,
        }
    }
}

/// Retries a deferred chunk with exponential back-off. Nothing more is
/// read from the socket meanwhile, which pushes back on the peer.
async fn retry_backlog(
    id: ConnectionId,
    adapter: &mut ProtocolAdapter,
    queue: &DispatchQueue,
    mut last: PacketforgeError,
) -> Result<(), PacketforgeError> {
    let mut delay = RETRY_DELAY;
    for attempt in 1..=MAX_RETRIES {
        tokio::time::sleep(delay).await;
        match adapter.on_receive(id, &[], queue) {
            Ok(forwarded) => {
                tracing::debug!(%id, attempt, forwarded, "deferred chunk processed");
                return Ok(());
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => last = e,
        }
        delay *= 2;
    }
    tracing::warn!(%id, retries = MAX_RETRIES, "giving up on deferred chunk");
    Err(last)
}

/// Drains the connection's send queue onto the socket.
async fn write_loop(conn: Arc<TcpConnection>, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    let id = conn.id();
    while let Some(frame) = rx.recv().await {
        if let Err(e) = conn.send(&frame).await {
            tracing::debug!(%id, error = %e, "send failed, stopping writer");
            break;
        }
    }
    tracing::trace!(%id, "writer finished");
}
