//! Logic workers: the threads that drain the dispatch queue.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

use crate::queue::{DispatchQueue, QueueReceiver};
use crate::{Category, DbResult, DispatchError, Packet};

// ---------------------------------------------------------------------------
// Extension points
// ---------------------------------------------------------------------------

/// Application packet handling. One instance per logic worker.
///
/// `on_packet` sees every packet its worker pops, including the final
/// [`Packet::ServerShutdown`]. The packet is only borrowed: a pooled
/// payload goes back to its pool as soon as the call returns.
pub trait LogicHandler: Send + 'static {
    fn on_packet(&mut self, packet: &Packet);

    /// Called once after the worker has handled its shutdown sentinel.
    fn on_shutdown(&mut self) {}
}

impl<F> LogicHandler for F
where
    F: FnMut(&Packet) + Send + 'static,
{
    fn on_packet(&mut self, packet: &Packet) {
        self(packet)
    }
}

/// Receives database results once the logic handler is done with them.
pub trait DbCompletion: Send + Sync + 'static {
    fn complete(&self, result: DbResult);
}

/// Drops database results, logging each one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardDbResults;

impl DbCompletion for DiscardDbResults {
    fn complete(&self, result: DbResult) {
        tracing::debug!(
            request_id = result.request_id,
            status = result.status.code(),
            "db result discarded (no completion registered)"
        );
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How packets are spread over several logic workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Routing {
    /// Packets of one connection always go to the same worker, so each
    /// connection's stream is handled in order. Ownerless packets rotate.
    #[default]
    ByConnection,
    /// Every packet goes to the next worker in turn. No ordering at all
    /// across workers.
    RoundRobin,
}

/// Logic worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of logic threads. One gives global ordering.
    pub logic_threads: usize,
    pub routing: Routing,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            logic_threads: 1,
            routing: Routing::default(),
        }
    }
}

impl DispatchConfig {
    /// Upper bound on logic threads.
    pub const MAX_LOGIC_THREADS: usize = 64;

    pub fn with_threads(logic_threads: usize) -> Self {
        Self {
            logic_threads,
            ..Default::default()
        }
    }

    /// Clamps `logic_threads` to `1..=MAX_LOGIC_THREADS`.
    pub fn validated(mut self) -> Self {
        let clamped = self.logic_threads.clamp(1, Self::MAX_LOGIC_THREADS);
        if clamped != self.logic_threads {
            tracing::warn!(
                requested = self.logic_threads,
                clamped,
                "logic_threads out of range, clamping"
            );
            self.logic_threads = clamped;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Disposal
// ---------------------------------------------------------------------------

/// Gets rid of a handled packet according to its category.
///
/// Returns [`ControlFlow::Break`] for the shutdown sentinel.
pub fn dispose(packet: Packet, db: &dyn DbCompletion) -> ControlFlow<()> {
    match packet {
        Packet::Data { payload, .. } => {
            payload.release();
            ControlFlow::Continue(())
        }
        Packet::Connect { .. }
        | Packet::Disconnect { .. }
        | Packet::Timer { .. }
        | Packet::Shouter { .. } => ControlFlow::Continue(()),
        Packet::DbResult(result) => {
            db.complete(result);
            ControlFlow::Continue(())
        }
        Packet::ServerShutdown => ControlFlow::Break(()),
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// What one worker did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    /// Packets handled, the shutdown sentinel included.
    pub processed: u64,
    /// Per-category counts, indexed like [`Category::ALL`].
    pub by_category: [u64; 7],
}

impl WorkerReport {
    fn record(&mut self, category: Category) {
        self.processed += 1;
        if let Some(i) = Category::ALL.iter().position(|c| *c == category) {
            self.by_category[i] += 1;
        }
    }

    /// How many packets of `category` this worker handled.
    pub fn count(&self, category: Category) -> u64 {
        Category::ALL
            .iter()
            .position(|c| *c == category)
            .map_or(0, |i| self.by_category[i])
    }
}

/// A running set of logic threads and the queue that feeds them.
pub struct LogicDispatcher {
    queue: DispatchQueue,
    workers: Vec<JoinHandle<WorkerReport>>,
}

impl LogicDispatcher {
    /// Starts `config.logic_threads` workers. Database results are
    /// discarded after handling.
    pub fn spawn<H, F>(config: DispatchConfig, factory: F) -> Result<Self, DispatchError>
    where
        H: LogicHandler,
        F: FnMut(usize) -> H,
    {
        Self::spawn_with_db(config, Arc::new(DiscardDbResults), factory)
    }

    /// Starts the workers, forwarding database results to `db`.
    ///
    /// `factory` is called once per worker with the worker index.
    pub fn spawn_with_db<H, F>(
        config: DispatchConfig,
        db: Arc<dyn DbCompletion>,
        mut factory: F,
    ) -> Result<Self, DispatchError>
    where
        H: LogicHandler,
        F: FnMut(usize) -> H,
    {
        let config = config.validated();
        let (queue, receivers) = DispatchQueue::new(config.logic_threads, config.routing);

        let mut workers = Vec::with_capacity(receivers.len());
        for rx in receivers {
            let index = rx.index();
            let handler = factory(index);
            let db = Arc::clone(&db);
            let spawned = thread::Builder::new()
                .name(format!("packetforge-logic-{index}"))
                .spawn(move || run_worker(rx, handler, db));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    // Stop the workers that did start.
                    let _ = queue.shutdown();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(DispatchError::Spawn { index, source });
                }
            }
        }

        tracing::info!(
            workers = workers.len(),
            routing = ?config.routing,
            "logic dispatcher started"
        );
        Ok(Self { queue, workers })
    }

    /// A producer handle onto the queue.
    pub fn queue(&self) -> DispatchQueue {
        self.queue.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Sends the shutdown sentinel, waits for every worker to drain its
    /// lane, and returns their reports in worker order.
    ///
    /// If the sentinel was already pushed by someone else this just
    /// waits.
    pub fn shutdown(self) -> Result<Vec<WorkerReport>, DispatchError> {
        if self.queue.shutdown().is_err() {
            tracing::debug!("dispatch queue already closed, joining workers");
        }
        self.join()
    }

    /// Waits for every worker to stop, without sending the sentinel.
    pub fn join(self) -> Result<Vec<WorkerReport>, DispatchError> {
        let mut reports = Vec::with_capacity(self.workers.len());
        for (index, handle) in self.workers.into_iter().enumerate() {
            let report = handle
                .join()
                .map_err(|_| DispatchError::WorkerPanicked(index))?;
            reports.push(report);
        }
        Ok(reports)
    }
}

impl std::fmt::Debug for LogicDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicDispatcher")
            .field("queue", &self.queue)
            .field("workers", &self.workers.len())
            .finish()
    }
}

fn run_worker<H: LogicHandler>(
    mut rx: QueueReceiver,
    mut handler: H,
    db: Arc<dyn DbCompletion>,
) -> WorkerReport {
    let mut report = WorkerReport {
        worker: rx.index(),
        ..Default::default()
    };
    tracing::debug!(worker = report.worker, "logic worker running");

    while let Some(packet) = rx.blocking_pop() {
        let category = packet.category();
        tracing::trace!(worker = report.worker, %category, owner = ?packet.owner(), "handling packet");
        handler.on_packet(&packet);
        report.record(category);
        if dispose(packet, db.as_ref()).is_break() {
            break;
        }
    }

    handler.on_shutdown();
    tracing::debug!(
        worker = report.worker,
        processed = report.processed,
        "logic worker terminated"
    );
    report
}
