//! Dispatch layer for Packetforge.
//!
//! Network tasks decode packets; logic threads act on them. This crate
//! is the hand-off between the two:
//!
//! - [`Packet`]: one variant per category (data, connect, timer, ...).
//! - [`DispatchQueue`]: the multi-producer FIFO every source pushes to.
//! - [`LogicDispatcher`]: the worker threads that pop, call the
//!   application's [`LogicHandler`], and then [`dispose`] of each packet.
//!
//! # Ordering
//!
//! With the default single logic thread every packet is handled in push
//! order. With more threads, packets are spread per [`Routing`] and
//! ordering is only guaranteed within one connection.
//!
//! # Shutdown
//!
//! Stopping is a packet too: [`Packet::ServerShutdown`] travels through
//! the same lanes as regular traffic, so everything queued before it is
//! handled before the workers exit.

mod error;
mod logic;
mod packet;
mod queue;

pub use error::DispatchError;
pub use logic::{
    dispose, DbCompletion, DiscardDbResults, DispatchConfig, LogicDispatcher, LogicHandler,
    Routing, WorkerReport,
};
pub use packet::{
    Category, DbResult, DbStatus, Packet, DBRESULT_ERROR_UNKNOWN, DBRESULT_STATE_SUCCESS,
};
pub use queue::{DispatchQueue, QueueReceiver};
