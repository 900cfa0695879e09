//! Codec strategies: one per wire format, all behind [`PacketCodec`].
//!
//! Every codec shares the same header framing (see [`crate::frame`]) and
//! differs only in what the payload bytes mean:
//!
//! | Codec            | Payload                        | Pooled |
//! |------------------|--------------------------------|--------|
//! | [`BinaryCodec`]  | raw bytes                      | yes    |
//! | [`JsonCodec`]    | JSON object                    | no     |
//! | [`MsgPackCodec`] | MessagePack map                | no     |
//! | [`ProtobufCodec`]| protobuf message, by packet id | yes    |
//!
//! The adapter holds a `Box<dyn PacketCodec>` picked at construction,
//! so a server chooses its wire format without being generic over it.

mod binary;
mod json;
#[cfg(feature = "msgpack")]
mod msgpack;
#[cfg(feature = "protobuf")]
mod protobuf;

pub use binary::BinaryCodec;
pub use json::JsonCodec;
#[cfg(feature = "msgpack")]
pub use msgpack::MsgPackCodec;
#[cfg(feature = "protobuf")]
pub use protobuf::ProtobufCodec;

use std::borrow::Cow;

use crate::buffer::TransferBuffer;
use crate::frame::FrameCodec;
use crate::header::{OptionFlags, PacketHeader};
use crate::packet::Payload;
use crate::{ProtocolConfig, ProtocolError};

/// A wire format: turns buffered bytes into [`Payload`]s and back.
///
/// One instance serves one connection. It owns that connection's
/// transfer buffer, so it is driven by one task at a time through
/// `&mut self`; the `Send + Sync` bounds let the adapter move it
/// between tokio worker threads.
pub trait PacketCodec: Send + Sync {
    /// Short name of the wire format, for logs.
    fn name(&self) -> &'static str;

    /// The validated configuration in effect.
    fn config(&self) -> &ProtocolConfig;

    /// Re-sizes the transfer buffer and packet limit. Discards anything
    /// buffered.
    fn initialize(&mut self, io_buffer_size: usize, max_packet_size: usize);

    /// Appends bytes received from the transport.
    ///
    /// # Errors
    /// [`ProtocolError::BufferOverflow`] if they do not fit; nothing is
    /// appended in that case.
    fn add_transferred_data(&mut self, data: &[u8]) -> Result<(), ProtocolError>;

    /// How many more bytes [`add_transferred_data`](Self::add_transferred_data)
    /// would accept right now.
    fn remaining_capacity(&self) -> usize;

    /// Extracts and decodes the next complete frame.
    ///
    /// `Ok(None)` means "wait for more bytes". A fatal error (see
    /// [`ProtocolError::is_fatal`]) means the stream is desynchronized.
    fn get_packet(&mut self) -> Result<Option<Payload>, ProtocolError>;

    /// Encodes a payload into one complete frame.
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, ProtocolError>;

    /// Encodes a payload into a caller-provided buffer and returns the
    /// number of bytes written.
    ///
    /// # Errors
    /// [`ProtocolError::BufferTooSmall`] if the frame does not fit; `out`
    /// is left untouched in that case.
    fn get_packet_data(&self, payload: &Payload, out: &mut [u8]) -> Result<usize, ProtocolError> {
        let frame = self.encode(payload)?;
        let capacity = out.len();
        let dst = out
            .get_mut(..frame.len())
            .ok_or(ProtocolError::BufferTooSmall {
                needed: frame.len(),
                capacity,
            })?;
        dst.copy_from_slice(&frame);
        Ok(frame.len())
    }

    /// Gives a decoded packet back: pooled bodies return to their pool,
    /// everything else is freed.
    fn dispose_packet(&self, payload: Payload) {
        payload.release();
    }

    /// Discards anything buffered (e.g. before reusing a connection slot).
    fn reset(&mut self);

    /// A new instance with the same configuration and pool but an empty
    /// transfer buffer.
    fn fresh(&self) -> Box<dyn PacketCodec>;
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// The framing state every codec builds on: the connection's transfer
/// buffer plus the frame transforms.
#[derive(Debug)]
pub struct Framing {
    config: ProtocolConfig,
    buffer: TransferBuffer,
    frames: FrameCodec,
}

impl Framing {
    /// Validates `config` and allocates the transfer buffer.
    pub fn new(config: ProtocolConfig) -> Self {
        let config = config.validated();
        let buffer = TransferBuffer::new(config.io_buffer_size, config.max_packet_size);
        let frames = FrameCodec::new(&config);
        Self {
            config,
            buffer,
            frames,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn initialize(&mut self, io_buffer_size: usize, max_packet_size: usize) {
        let mut config = self.config.clone();
        config.io_buffer_size = io_buffer_size;
        config.max_packet_size = max_packet_size;
        *self = Self::new(config);
    }

    pub fn append(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.buffer.append(data)
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn has_frame(&self) -> Result<bool, ProtocolError> {
        self.buffer.has_frame()
    }

    /// Consumes the next frame and undoes its transforms.
    pub fn next_decoded(&mut self) -> Result<Option<(PacketHeader, Cow<'_, [u8]>)>, ProtocolError> {
        let Some(raw) = self.buffer.next_frame()? else {
            return Ok(None);
        };
        let data = self.frames.decode(&raw)?;
        Ok(Some((raw.header, data)))
    }

    /// Frames `body`.
    ///
    /// A packet that carries no options of its own goes out with the
    /// configured default options.
    pub fn encode(
        &self,
        packet_id: u16,
        options: OptionFlags,
        body: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let options = if options == OptionFlags::empty() {
            self.config.default_options
        } else {
            options
        };
        self.frames.encode(packet_id, options, body)
    }

    pub fn reset(&mut self) {
        self.buffer.reset();
    }

    /// Same configuration, empty buffer.
    pub fn fresh(&self) -> Self {
        Self {
            config: self.config.clone(),
            buffer: TransferBuffer::new(self.config.io_buffer_size, self.config.max_packet_size),
            frames: self.frames.clone(),
        }
    }
}
