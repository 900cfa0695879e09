//! The hand-off queue between network tasks and logic threads.
//!
//! Internally there is one unbounded FIFO lane per logic worker:
//!
//! ```text
//!   conn-1 ─┐                       ┌─▶ lane 0 ─▶ worker 0
//!   conn-2 ─┼─▶ DispatchQueue::push ┤
//!   timer  ─┘      (route)          └─▶ lane 1 ─▶ worker 1
//! ```
//!
//! With a single worker there is a single lane and every packet is
//! delivered in push order. With several workers, ordering holds per
//! lane only: packets of one connection always share a lane under
//! [`Routing::ByConnection`], so a connection's stream stays ordered
//! while different connections may be handled out of order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

use crate::{DispatchError, Packet, Routing};

struct Lanes {
    senders: RwLock<Option<Vec<mpsc::UnboundedSender<Packet>>>>,
    lane_count: usize,
    routing: Routing,
    next: AtomicUsize,
    pending: Arc<AtomicUsize>,
}

/// Multi-producer handle onto the dispatch lanes. Cheap to clone.
#[derive(Clone)]
pub struct DispatchQueue {
    lanes: Arc<Lanes>,
}

impl DispatchQueue {
    /// Creates a queue with `lanes` lanes (minimum one) and returns the
    /// receiving end of each.
    pub fn new(lanes: usize, routing: Routing) -> (Self, Vec<QueueReceiver>) {
        let lane_count = lanes.max(1);
        let pending = Arc::new(AtomicUsize::new(0));
        let mut senders = Vec::with_capacity(lane_count);
        let mut receivers = Vec::with_capacity(lane_count);
        for index in 0..lane_count {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push(QueueReceiver {
                index,
                rx,
                pending: Arc::clone(&pending),
            });
        }

        let queue = Self {
            lanes: Arc::new(Lanes {
                senders: RwLock::new(Some(senders)),
                lane_count,
                routing,
                next: AtomicUsize::new(0),
                pending,
            }),
        };
        (queue, receivers)
    }

    /// Number of lanes (logic workers).
    pub fn lanes(&self) -> usize {
        self.lanes.lane_count
    }

    /// Packets pushed and not yet popped, across all lanes.
    pub fn pending(&self) -> usize {
        self.lanes.pending.load(Ordering::Acquire)
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_closed(&self) -> bool {
        self.read_senders().is_none()
    }

    /// Enqueues a packet. Ownership moves to the queue.
    ///
    /// Pushing [`Packet::ServerShutdown`] is the same as calling
    /// [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    /// [`DispatchError::Closed`] (carrying the packet back) if the queue
    /// has been shut down.
    pub fn push(&self, packet: Packet) -> Result<(), DispatchError> {
        if matches!(packet, Packet::ServerShutdown) {
            return self.shutdown();
        }

        let senders = self.read_senders();
        let Some(senders) = senders.as_ref() else {
            return Err(DispatchError::Closed(Box::new(packet)));
        };
        let lane = self.lane_for(&packet);
        tracing::trace!(lane, category = %packet.category(), "packet queued");
        self.lanes.pending.fetch_add(1, Ordering::AcqRel);
        // A lane only closes when its worker has already stopped.
        senders[lane].send(packet).map_err(|e| {
            self.lanes.pending.fetch_sub(1, Ordering::AcqRel);
            DispatchError::Closed(Box::new(e.0))
        })
    }

    /// Sends the stop sentinel down every lane and closes the queue.
    ///
    /// Everything pushed before this call is delivered before the
    /// sentinel; every push after it fails.
    ///
    /// # Errors
    /// [`DispatchError::Closed`] if the queue was already shut down.
    pub fn shutdown(&self) -> Result<(), DispatchError> {
        let mut guard = self
            .lanes
            .senders
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = guard.take() else {
            return Err(DispatchError::Closed(Box::new(Packet::ServerShutdown)));
        };
        for sender in &senders {
            self.lanes.pending.fetch_add(1, Ordering::AcqRel);
            if sender.send(Packet::ServerShutdown).is_err() {
                self.lanes.pending.fetch_sub(1, Ordering::AcqRel);
            }
        }
        tracing::debug!(lanes = senders.len(), "dispatch queue shut down");
        Ok(())
    }

    fn lane_for(&self, packet: &Packet) -> usize {
        let n = self.lanes.lane_count;
        if n == 1 {
            return 0;
        }
        match (self.lanes.routing, packet.owner()) {
            (Routing::ByConnection, Some(owner)) => (owner.into_inner() % n as u64) as usize,
            _ => self.lanes.next.fetch_add(1, Ordering::Relaxed) % n,
        }
    }

    fn read_senders(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, Option<Vec<mpsc::UnboundedSender<Packet>>>> {
        self.lanes
            .senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("lanes", &self.lanes.lane_count)
            .field("routing", &self.lanes.routing)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The consuming end of one lane.
#[derive(Debug)]
pub struct QueueReceiver {
    index: usize,
    rx: mpsc::UnboundedReceiver<Packet>,
    pending: Arc<AtomicUsize>,
}

impl QueueReceiver {
    /// Which lane this is.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Blocks the current thread until a packet arrives.
    ///
    /// Returns `None` once the lane is closed and drained. Must not be
    /// called from inside an async runtime.
    pub fn blocking_pop(&mut self) -> Option<Packet> {
        let packet = self.rx.blocking_recv()?;
        self.popped();
        Some(packet)
    }

    /// Waits asynchronously for the next packet.
    pub async fn pop(&mut self) -> Option<Packet> {
        let packet = self.rx.recv().await?;
        self.popped();
        Some(packet)
    }

    /// Takes a packet if one is ready.
    pub fn try_pop(&mut self) -> Option<Packet> {
        let packet = self.rx.try_recv().ok()?;
        self.popped();
        Some(packet)
    }

    fn popped(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}
