//! Protocol configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::ENCRYPT_OVERHEAD;
use crate::header::{OptionFlags, MAX_HEADER_SIZE};

/// Largest I/O buffer the engine will allocate per connection.
pub const MAX_IO_SIZE: usize = 16384;

/// Largest payload a single frame may carry.
pub const MAX_PACKET_SIZE: usize = 8192;

/// Default per-connection I/O buffer size.
pub const DEFAULT_IO_SIZE: usize = 8192;

/// Default maximum payload size.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// Payloads at or below this many bytes are never compressed.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

/// Default number of packets preallocated per packet pool.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// Smallest I/O buffer that still holds a header and some payload.
const MIN_IO_SIZE: usize = 64;

/// A 256-bit symmetric key for payload encryption.
///
/// `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Wraps raw key bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Limits and transform settings shared by every codec instance.
///
/// Supplied once at construction. Call [`validated`](Self::validated)
/// (codecs do this for you) to clamp out-of-range values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Capacity of each connection's transfer buffer.
    pub io_buffer_size: usize,
    /// Largest application payload a frame may carry, before transforms.
    /// Encrypted frames carry up to `ENCRYPT_OVERHEAD` more bytes on the
    /// wire.
    pub max_packet_size: usize,
    /// Transforms applied to every outbound frame.
    pub default_options: OptionFlags,
    /// Minimum payload length before compression kicks in.
    pub compression_threshold: usize,
    /// Key for the `ENCRYPT` transform. Required if any frame uses it.
    pub encryption_key: Option<EncryptionKey>,
    /// Packets preallocated in each packet pool.
    pub pool_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            io_buffer_size: DEFAULT_IO_SIZE,
            max_packet_size: DEFAULT_PACKET_SIZE,
            default_options: OptionFlags::empty(),
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            encryption_key: None,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl ProtocolConfig {
    /// Creates a config with the given buffer and packet limits.
    pub fn with_limits(io_buffer_size: usize, max_packet_size: usize) -> Self {
        Self {
            io_buffer_size,
            max_packet_size,
            ..Default::default()
        }
    }

    /// Sets the transforms applied to outbound frames.
    pub fn with_options(mut self, options: OptionFlags) -> Self {
        self.default_options = options;
        self
    }

    /// Sets the encryption key.
    pub fn with_key(mut self, key: EncryptionKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Rules:
    /// - `io_buffer_size` clamped to `64..=MAX_IO_SIZE`.
    /// - `max_packet_size` clamped to `1..=MAX_PACKET_SIZE`, and further
    ///   so that a maximal frame (checksum header + encrypted payload)
    ///   fits in the I/O buffer.
    /// - Unknown option bits are dropped.
    pub fn validated(mut self) -> Self {
        if self.io_buffer_size > MAX_IO_SIZE || self.io_buffer_size < MIN_IO_SIZE {
            let clamped = self.io_buffer_size.clamp(MIN_IO_SIZE, MAX_IO_SIZE);
            tracing::warn!(
                requested = self.io_buffer_size,
                clamped,
                "io_buffer_size out of range, clamping"
            );
            self.io_buffer_size = clamped;
        }

        let ceiling =
            MAX_PACKET_SIZE.min(self.io_buffer_size - MAX_HEADER_SIZE - ENCRYPT_OVERHEAD);
        if self.max_packet_size > ceiling || self.max_packet_size == 0 {
            let clamped = self.max_packet_size.clamp(1, ceiling);
            tracing::warn!(
                requested = self.max_packet_size,
                clamped,
                io_buffer_size = self.io_buffer_size,
                "max_packet_size does not fit the I/O buffer, clamping"
            );
            self.max_packet_size = clamped;
        }

        if !self.default_options.is_valid() {
            let cleaned = OptionFlags::from_raw(
                self.default_options.raw()
                    & (OptionFlags::CHECKSUM
                        | OptionFlags::COMPRESS
                        | OptionFlags::ENCRYPT
                        | OptionFlags::CHECKSUM_DIGEST),
            );
            tracing::warn!(
                requested = %self.default_options,
                cleaned = %cleaned,
                "invalid default option flags, dropping unknown bits"
            );
            self.default_options = cleaned;
        }
        self
    }
}
