//! Per-connection transfer buffer.
//!
//! Bytes arrive from the transport in arbitrary chunks. The transfer
//! buffer accumulates them and slices complete frames off the front:
//!
//! ```text
//!              head                      len            capacity
//!   ┌───────────┬──────────────────────────┬────────────────┐
//!   │ consumed  │ buffered (partial frame) │ free           │
//!   └───────────┴──────────────────────────┴────────────────┘
//! ```
//!
//! Consumed bytes are reclaimed lazily by shifting the buffered tail to
//! the front when an append needs the room. The backing allocation is
//! made once and never grows.

use crate::frame::{max_body_len, RawFrame};
use crate::header::PacketHeader;
use crate::ProtocolError;

/// Accumulates raw bytes and extracts whole frames.
#[derive(Debug)]
pub struct TransferBuffer {
    buf: Vec<u8>,
    head: usize,
    capacity: usize,
    max_packet_size: usize,
}

impl TransferBuffer {
    /// Creates an empty buffer holding at most `capacity` bytes, that
    /// accepts frames with at most `max_packet_size` payload bytes (plus
    /// the cipher overhead on encrypted frames).
    pub fn new(capacity: usize, max_packet_size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            head: 0,
            capacity,
            max_packet_size,
        }
    }

    /// Bytes currently buffered and not yet consumed.
    pub fn len(&self) -> usize {
        self.buf.len() - self.head
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many more bytes `append` would currently accept.
    pub fn remaining(&self) -> usize {
        self.capacity - self.len()
    }

    /// Copies `data` to the tail of the buffer.
    ///
    /// # Errors
    /// Returns [`ProtocolError::BufferOverflow`] if the result would
    /// exceed the capacity. The buffer is left untouched in that case.
    pub fn append(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if data.len() > self.remaining() {
            return Err(ProtocolError::BufferOverflow {
                buffered: self.len(),
                incoming: data.len(),
                capacity: self.capacity,
            });
        }
        if self.buf.len() + data.len() > self.capacity {
            self.compact();
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Parses the header at the front of the buffer, if one is complete.
    ///
    /// # Errors
    /// - [`ProtocolError::Header`] if the option bits are invalid.
    /// - [`ProtocolError::PayloadTooLarge`] if the declared payload
    ///   exceeds what a maximal packet with these options encodes to.
    pub fn peek_header(&self) -> Result<Option<PacketHeader>, ProtocolError> {
        let Some(header) = PacketHeader::peek(&self.buf[self.head..])? else {
            return Ok(None);
        };
        let max = max_body_len(self.max_packet_size, header.options);
        if usize::from(header.data_length) > max {
            return Err(ProtocolError::PayloadTooLarge {
                len: usize::from(header.data_length),
                max,
            });
        }
        Ok(Some(header))
    }

    /// Returns `true` if a whole frame is buffered.
    pub fn has_frame(&self) -> Result<bool, ProtocolError> {
        Ok(self
            .peek_header()?
            .is_some_and(|h| self.len() >= h.frame_len()))
    }

    /// Removes the next complete frame from the front of the buffer.
    ///
    /// Returns `Ok(None)` while the header or the payload is still
    /// partial; the caller should wait for more bytes.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame<'_>>, ProtocolError> {
        let Some(header) = self.peek_header()? else {
            return Ok(None);
        };
        if self.len() < header.frame_len() {
            return Ok(None);
        }

        let start = self.head + header.encoded_len();
        let end = self.head + header.frame_len();
        self.head = end;
        Ok(Some(RawFrame {
            header,
            body: &self.buf[start..end],
        }))
    }

    /// Discards everything buffered. Keeps the allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.head = 0;
    }

    fn compact(&mut self) {
        if self.head == 0 {
            return;
        }
        self.buf.copy_within(self.head.., 0);
        self.buf.truncate(self.buf.len() - self.head);
        self.head = 0;
    }
}
