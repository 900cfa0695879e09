//! Fixed-capacity object pool for Packetforge.
//!
//! Decoded packets are drawn from an [`ObjectPool`] on the receive path
//! so a busy server does not allocate per packet. The pool is a fixed
//! backing array of slots plus a stack of free slot indices, guarded by
//! a mutex:
//!
//! ```text
//!   slots: [ Some(p0) | None | Some(p2) | None ]     free: [0, 2]
//!                        │             │
//!                        ▼             ▼
//!                   Pooled{slot 1}  Pooled{slot 3}   (checked out)
//! ```
//!
//! A checkout hands out a [`Pooled`] handle. The handle owns the object
//! while it is checked out and puts it back into its slot when it is
//! released or dropped. Because releasing consumes the handle, a packet
//! cannot be returned twice, and because dropping also returns it, a
//! packet cannot leak out of the pool.
//!
//! Exhaustion never blocks: [`ObjectPool::checkout`] reports
//! [`PoolError::Exhausted`] and the caller decides how to back off.

mod error;
mod pool;

pub use error::PoolError;
pub use pool::{ObjectPool, PoolStats, Pooled, Recycle};
