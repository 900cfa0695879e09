//! Packet header types and constants.
//!
//! Every frame on the wire starts with this little-endian header:
//!
//! ```text
//! ┌───────────┬───────────────┬──────────────────────┬──────────────┬─────────────┐
//! │ packet_id │ option_flags  │ checksum             │ data_length  │ payload     │
//! │ u16       │ u32           │ u32 (iff CHECKSUM)   │ u16          │ data_length │
//! └───────────┴───────────────┴──────────────────────┴──────────────┴─────────────┘
//! ```

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Header size without the checksum field.
pub const BASE_HEADER_SIZE: usize = 2 + 4 + 2;

/// Size of the optional checksum field.
pub const CHECKSUM_SIZE: usize = 4;

/// Largest possible header (checksum present).
pub const MAX_HEADER_SIZE: usize = BASE_HEADER_SIZE + CHECKSUM_SIZE;

/// Which checksum algorithm a frame uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// CRC-32 (IEEE).
    Crc32,
    /// First four bytes of the SHA-256 digest, little-endian.
    Digest,
}

/// Bitmask of the transforms applied to a frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionFlags(u32);

impl OptionFlags {
    /// A checksum field is present and covers the payload.
    pub const CHECKSUM: u32 = 1 << 0;

    /// The payload is LZ4-compressed.
    pub const COMPRESS: u32 = 1 << 1;

    /// The payload is encrypted.
    pub const ENCRYPT: u32 = 1 << 2;

    /// Checksum algorithm sub-flag: CRC-32 (also the default when no
    /// sub-flag is set).
    pub const CHECKSUM_DEFAULT: u32 = 1 << 3;

    /// Checksum algorithm sub-flag: truncated SHA-256.
    pub const CHECKSUM_DIGEST: u32 = 1 << 4;

    const KNOWN_MASK: u32 = 0b1_1111;

    /// No transforms.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates flags from a raw value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw flag bits.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `flag` is set.
    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Returns a copy with `flag` set.
    pub const fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }

    /// Returns a copy with `flag` cleared.
    pub const fn without(self, flag: u32) -> Self {
        Self(self.0 & !flag)
    }

    /// Returns `true` if the header carries a checksum field.
    pub const fn has_checksum(self) -> bool {
        self.contains(Self::CHECKSUM)
    }

    /// The checksum algorithm selected by the sub-flags.
    pub const fn checksum_kind(self) -> ChecksumKind {
        if self.contains(Self::CHECKSUM_DIGEST) {
            ChecksumKind::Digest
        } else {
            ChecksumKind::Crc32
        }
    }

    /// Returns `true` if only known bits are set and at most one
    /// checksum algorithm is selected.
    pub const fn is_valid(self) -> bool {
        let unknown = self.0 & !Self::KNOWN_MASK != 0;
        let both_algorithms =
            self.contains(Self::CHECKSUM_DEFAULT) && self.contains(Self::CHECKSUM_DIGEST);
        !unknown && !both_algorithms
    }

    /// Header length for frames carrying these flags.
    pub const fn header_len(self) -> usize {
        if self.has_checksum() {
            MAX_HEADER_SIZE
        } else {
            BASE_HEADER_SIZE
        }
    }
}

impl BitOr<u32> for OptionFlags {
    type Output = Self;

    fn bitor(self, rhs: u32) -> Self {
        self.with(rhs)
    }
}

impl fmt::Display for OptionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Selects the application handler.
    pub packet_id: u16,
    /// Transforms applied to the payload.
    pub options: OptionFlags,
    /// Checksum over the payload bytes as sent; 0 when absent.
    pub checksum: u32,
    /// Number of payload bytes following the header.
    pub data_length: u16,
}

impl PacketHeader {
    /// Header length on the wire.
    pub const fn encoded_len(&self) -> usize {
        self.options.header_len()
    }

    /// Header plus payload length on the wire.
    pub const fn frame_len(&self) -> usize {
        self.encoded_len() + self.data_length as usize
    }

    /// Appends the header bytes to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.packet_id.to_le_bytes());
        out.extend_from_slice(&self.options.raw().to_le_bytes());
        if self.options.has_checksum() {
            out.extend_from_slice(&self.checksum.to_le_bytes());
        }
        out.extend_from_slice(&self.data_length.to_le_bytes());
    }

    /// Parses a header from the front of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` does not yet hold a whole header.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Header`] if the option bits are invalid.
    pub fn peek(buf: &[u8]) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < BASE_HEADER_SIZE {
            return Ok(None);
        }

        let packet_id = u16::from_le_bytes([buf[0], buf[1]]);
        let options = OptionFlags::from_raw(u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]));
        if !options.is_valid() {
            return Err(ProtocolError::Header(format!(
                "invalid option flags {options} for packet {packet_id}"
            )));
        }

        if buf.len() < options.header_len() {
            return Ok(None);
        }

        let (checksum, at) = if options.has_checksum() {
            (u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]), 10)
        } else {
            (0, 6)
        };
        let data_length = u16::from_le_bytes([buf[at], buf[at + 1]]);

        Ok(Some(Self {
            packet_id,
            options,
            checksum,
            data_length,
        }))
    }
}
