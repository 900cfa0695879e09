//! `Engine` builder and accept loop.
//!
//! This is the entry point for running a Packetforge server. It ties
//! together all the layers: transport → adapter → dispatch queue →
//! logic workers, with timers feeding the same queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use packetforge_dispatch::{
    DbCompletion, DiscardDbResults, DispatchConfig, DispatchQueue, LogicDispatcher, LogicHandler,
    WorkerReport,
};
use packetforge_protocol::{
    BinaryCodec, OptionFlags, PacketCodec, Payload, ProtocolConfig, ProtocolError,
};
use packetforge_timer::{TimerConfig, TimerService};
use packetforge_transport::{ConnectionId, TcpTransport, Transmit, Transport};
use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::adapter::ProtocolAdapter;
use crate::handler::{handle_connection, Shared};
use crate::outbox::Outbox;
use crate::{EngineConfig, PacketforgeError};

/// Builder for configuring and starting an [`Engine`].
///
/// # Example
///
/// ```rust,ignore
/// use packetforge::prelude::*;
///
/// let engine = Engine::builder()
///     .bind("0.0.0.0:7000")
///     .timer(TimerConfig::standard(TIMER_1_SEC))
///     .build(|_worker, sender| EchoHandler { sender })
///     .await?;
/// engine.run().await?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    codec: Option<Box<dyn PacketCodec>>,
    db: Arc<dyn DbCompletion>,
    timers: Vec<TimerConfig>,
}

impl EngineBuilder {
    /// Creates a new builder with default settings and the binary codec.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            codec: None,
            db: Arc::new(DiscardDbResults),
            timers: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the protocol configuration used by the default binary codec.
    pub fn protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.config.protocol = protocol;
        self
    }

    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.config.dispatch = dispatch;
        self
    }

    pub fn logic_threads(mut self, threads: usize) -> Self {
        self.config.dispatch.logic_threads = threads;
        self
    }

    /// Drops connections that stay silent this long. Zero disables it.
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.config.recv_timeout_secs = timeout.as_secs();
        self
    }

    /// Uses `codec` as the wire format. Its own protocol configuration
    /// takes precedence over [`protocol`](Self::protocol).
    pub fn codec(mut self, codec: impl PacketCodec + 'static) -> Self {
        self.codec = Some(Box::new(codec));
        self
    }

    /// Where database results go once the logic handler has seen them.
    pub fn db_completion(mut self, db: Arc<dyn DbCompletion>) -> Self {
        self.db = db;
        self
    }

    /// Registers a periodic timer.
    pub fn timer(mut self, timer: TimerConfig) -> Self {
        self.timers.push(timer);
        self
    }

    pub fn timers(mut self, timers: impl IntoIterator<Item = TimerConfig>) -> Self {
        self.timers.extend(timers);
        self
    }

    /// Binds the listener, starts the logic workers and timers.
    ///
    /// `factory` is called once per logic worker with its index and a
    /// [`PacketSender`] for replying to clients.
    pub async fn build<H, F>(self, mut factory: F) -> Result<Engine, PacketforgeError>
    where
        H: LogicHandler,
        F: FnMut(usize, PacketSender) -> H,
    {
        let config = self.config.validated();
        let codec = self
            .codec
            .unwrap_or_else(|| Box::new(BinaryCodec::new(config.protocol.clone())));
        check_codec(codec.as_ref())?;

        let transport = TcpTransport::bind(&config.bind_addr)
            .await?
            .with_read_chunk(codec.config().io_buffer_size);
        let template = Arc::new(ProtocolAdapter::from_boxed(codec));
        let outbox = Outbox::new();
        let sender = PacketSender {
            adapter: Arc::clone(&template),
            outbox: outbox.clone(),
        };

        let dispatcher =
            LogicDispatcher::spawn_with_db(config.dispatch.clone(), self.db, |worker| {
                factory(worker, sender.clone())
            })?;
        let timers = (!self.timers.is_empty())
            .then(|| TimerService::spawn(dispatcher.queue(), self.timers));

        tracing::info!(
            addr = %config.bind_addr,
            codec = template.codec_name(),
            logic_threads = dispatcher.worker_count(),
            "engine ready"
        );

        let shared = Arc::new(Shared {
            queue: dispatcher.queue(),
            outbox,
            template,
            recv_timeout: config.recv_timeout(),
        });
        Ok(Engine {
            transport,
            dispatcher,
            timers,
            shared,
            sender,
            stop: Arc::new(Notify::new()),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects codec settings that would fail on the first send.
fn check_codec(codec: &dyn PacketCodec) -> Result<(), ProtocolError> {
    let config = codec.config();
    if config.default_options.contains(OptionFlags::ENCRYPT) && config.encryption_key.is_none() {
        return Err(ProtocolError::Config(
            "default options include ENCRYPT but no encryption_key is set".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

/// Encodes packets and queues them for delivery. Cheap to clone; safe
/// to use from logic threads.
#[derive(Clone)]
pub struct PacketSender {
    adapter: Arc<ProtocolAdapter>,
    outbox: Outbox,
}

impl PacketSender {
    /// Sends one packet to one connection. Returns the frame length.
    pub fn send(&self, to: ConnectionId, payload: &Payload) -> Result<usize, PacketforgeError> {
        self.adapter.send_request(to, payload, &self.outbox)
    }

    /// Sends one packet to every connected client and returns how many
    /// it was queued for. The frame is encoded once.
    pub fn broadcast(&self, payload: &Payload) -> Result<usize, PacketforgeError> {
        let frame = self.adapter.encode(payload)?;
        let mut delivered = 0;
        for id in self.outbox.connections() {
            match self.outbox.transmit(id, frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(%id, error = %e, "broadcast skipped connection"),
            }
        }
        Ok(delivered)
    }

    /// Encodes `payload` into `out` without sending it.
    pub fn get_packet_data(&self, payload: &Payload, out: &mut [u8]) -> Result<usize, PacketforgeError> {
        Ok(self.adapter.get_packet_data(payload, out)?)
    }

    /// Connections currently able to receive.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.outbox.connections()
    }
}

impl std::fmt::Debug for PacketSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketSender")
            .field("codec", &self.adapter.codec_name())
            .field("connections", &self.outbox.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stops a running [`Engine`] from another task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    stop: Arc<Notify>,
}

impl EngineHandle {
    /// Asks the accept loop to stop. [`Engine::run`] then shuts down
    /// and returns the worker reports.
    pub fn stop(&self) {
        self.stop.notify_one();
    }
}

/// A Packetforge server with its logic workers running.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct Engine {
    transport: TcpTransport,
    dispatcher: LogicDispatcher,
    timers: Option<TimerService>,
    shared: Arc<Shared>,
    sender: PacketSender,
    stop: Arc<Notify>,
}

impl Engine {
    /// Creates a new builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// A producer handle onto the dispatch queue, for subsystems that
    /// inject packets of their own (database results, shouters).
    pub fn queue(&self) -> DispatchQueue {
        self.dispatcher.queue()
    }

    /// A sender sharing the engine's codec and connections.
    pub fn sender(&self) -> PacketSender {
        self.sender.clone()
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Runs the accept loop until [`EngineHandle::stop`] is called, then
    /// shuts down like [`shutdown`](Self::shutdown).
    ///
    /// Each accepted connection is handled by its own task.
    pub async fn run(mut self) -> Result<Vec<WorkerReport>, PacketforgeError> {
        tracing::info!("Packetforge engine running");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.stop.notified() => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        connections.spawn(handle_connection(conn, Arc::clone(&self.shared)));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                // Reap finished handlers so the set does not grow.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        connections.abort_all();
        while connections.join_next().await.is_some() {}
        self.shutdown().await
    }

    /// Stops timers and the listener, then sends the shutdown sentinel
    /// through the dispatch queue and waits for every logic worker.
    ///
    /// Everything queued before this call is handled first. Returns the
    /// per-worker reports.
    pub async fn shutdown(self) -> Result<Vec<WorkerReport>, PacketforgeError> {
        if let Some(timers) = &self.timers {
            timers.stop();
        }
        self.transport.shutdown().await?;

        let dispatcher = self.dispatcher;
        let reports = tokio::task::spawn_blocking(move || dispatcher.shutdown()).await??;
        tracing::info!(
            workers = reports.len(),
            processed = reports.iter().map(|r| r.processed).sum::<u64>(),
            "engine stopped"
        );
        Ok(reports)
    }
}
