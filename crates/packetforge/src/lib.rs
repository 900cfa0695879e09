//! # Packetforge
//!
//! Packet-protocol pipeline for multiplayer game backends.
//!
//! Packetforge turns each connection's raw byte stream into typed
//! packets, funnels them (together with connect/disconnect events,
//! timers, and database results) through one dispatch queue, and hands
//! them to the application on dedicated logic threads. Game developers
//! implement a single [`LogicHandler`](packetforge_dispatch::LogicHandler)
//! and reply through a [`PacketSender`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use packetforge::prelude::*;
//!
//! # async fn start() -> Result<(), PacketforgeError> {
//! let engine = Engine::builder()
//!     .bind("0.0.0.0:7000")
//!     .build(|_worker, sender: PacketSender| {
//!         move |packet: &Packet| {
//!             if let Packet::Data { owner, payload } = packet {
//!                 let _ = sender.send(*owner, payload);
//!             }
//!         }
//!     })
//!     .await?;
//! engine.run().await?;
//! # Ok(())
//! # }
//! ```

mod adapter;
mod config;
mod error;
mod handler;
mod logging;
mod outbox;
mod server;

pub use adapter::ProtocolAdapter;
pub use config::EngineConfig;
pub use error::PacketforgeError;
pub use logging::init_tracing;
pub use outbox::Outbox;
pub use server::{Engine, EngineBuilder, EngineHandle, PacketSender};

pub use packetforge_dispatch as dispatch;
pub use packetforge_pool as pool;
pub use packetforge_protocol as protocol;
pub use packetforge_timer as timer;
pub use packetforge_transport as transport;

/// Everything a typical server needs in one import.
pub mod prelude {
    pub use crate::{
        init_tracing, Engine, EngineBuilder, EngineConfig, EngineHandle, PacketSender,
        PacketforgeError, ProtocolAdapter,
    };
    pub use packetforge_dispatch::{
        Category, DbCompletion, DbResult, DbStatus, DispatchConfig, LogicHandler, Packet, Routing,
        WorkerReport,
    };
    pub use packetforge_protocol::{
        BinaryCodec, BinaryPacket, JsonCodec, JsonPacket, OptionFlags, PacketCodec, Payload,
        ProtocolConfig, ProtocolError,
    };
    #[cfg(feature = "msgpack")]
    pub use packetforge_protocol::{MsgPackCodec, MsgPackPacket};
    #[cfg(feature = "protobuf")]
    pub use packetforge_protocol::{ProtobufCodec, ProtobufPacket};
    pub use packetforge_timer::{
        TimerConfig, TimerPolicy, TIMER_100_MSEC, TIMER_10_SEC, TIMER_1_SEC, TIMER_200_MSEC,
        TIMER_2_SEC, TIMER_500_MSEC, TIMER_5_SEC,
    };
    pub use packetforge_transport::ConnectionId;
}
