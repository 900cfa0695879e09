//! Per-connection protocol adapter.
//!
//! The adapter is the glue between one connection's byte stream and the
//! dispatch queue. Bytes go in through [`ProtocolAdapter::on_receive`];
//! every complete packet comes out as a [`Packet::Data`] owned by that
//! connection.
//!
//! ```text
//! recv chunk → on_receive → codec (buffer + frame) → Packet::Data → DispatchQueue
//! ```

use std::borrow::Cow;

use packetforge_dispatch::{DispatchError, DispatchQueue, Packet};
use packetforge_protocol::{PacketCodec, Payload, ProtocolConfig, ProtocolError};
use packetforge_transport::{ConnectionId, Transmit};

use crate::PacketforgeError;

/// One connection's protocol pipeline.
///
/// Owns a codec instance (and through it the connection's transfer
/// buffer). Driven by one task at a time, so none of its state is
/// locked.
pub struct ProtocolAdapter {
    codec: Box<dyn PacketCodec>,
    /// Received bytes that did not fit into the transfer buffer yet.
    backlog: Vec<u8>,
}

impl ProtocolAdapter {
    pub fn new(codec: impl PacketCodec + 'static) -> Self {
        Self::from_boxed(Box::new(codec))
    }

    pub fn from_boxed(codec: Box<dyn PacketCodec>) -> Self {
        Self {
            codec,
            backlog: Vec::new(),
        }
    }

    /// Name of the wire format, for logs.
    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }

    pub fn config(&self) -> &ProtocolConfig {
        self.codec.config()
    }

    /// Re-sizes the transfer buffer. Discards anything buffered.
    pub fn initialize(&mut self, io_buffer_size: usize, max_packet_size: usize) {
        self.codec.initialize(io_buffer_size, max_packet_size);
        self.backlog.clear();
    }

    /// Bytes received but still waiting for room in the transfer buffer.
    pub fn backlog(&self) -> usize {
        self.backlog.len()
    }

    /// Feeds a received chunk through the codec and pushes every complete
    /// packet onto `queue`, owned by `owner`. Returns how many packets
    /// were forwarded.
    ///
    /// A chunk larger than the free space in the transfer buffer is fed
    /// in pieces, decoding in between. Whatever still does not fit (the
    /// packet pool ran dry, say) is kept and fed first on the next call;
    /// call again with an empty chunk to retry.
    ///
    /// # Errors
    /// - A fatal [`ProtocolError`]: the stream is desynchronized, close
    ///   the connection.
    /// - A non-fatal [`ProtocolError`]: back off and call again.
    /// - [`PacketforgeError::Shutdown`]: the queue is closed.
    pub fn on_receive(
        &mut self,
        owner: ConnectionId,
        data: &[u8],
        queue: &DispatchQueue,
    ) -> Result<usize, PacketforgeError> {
        let input = if self.backlog.is_empty() {
            Cow::Borrowed(data)
        } else {
            let mut pending = std::mem::take(&mut self.backlog);
            pending.extend_from_slice(data);
            Cow::Owned(pending)
        };

        let mut fed = 0;
        let mut forwarded = 0;
        let result = self.feed(owner, &input, &mut fed, &mut forwarded, queue);
        if fed < input.len() {
            // Only the unfed tail is kept.
            self.backlog = match input {
                Cow::Borrowed(data) => data[fed..].to_vec(),
                Cow::Owned(mut pending) => {
                    pending.drain(..fed);
                    pending
                }
            };
        }

        match result {
            Ok(()) => {
                tracing::trace!(%owner, bytes = data.len(), forwarded, "chunk processed");
                Ok(forwarded)
            }
            Err(e) => {
                if e.is_fatal() {
                    tracing::warn!(%owner, codec = self.codec_name(), error = %e, "protocol error, stream desynchronized");
                } else {
                    tracing::debug!(%owner, backlog = self.backlog.len(), error = %e, "receive deferred");
                }
                Err(e)
            }
        }
    }

    fn feed(
        &mut self,
        owner: ConnectionId,
        input: &[u8],
        fed: &mut usize,
        forwarded: &mut usize,
        queue: &DispatchQueue,
    ) -> Result<(), PacketforgeError> {
        loop {
            let room = self.codec.remaining_capacity();
            let take = room.min(input.len() - *fed);
            if take > 0 {
                self.codec.add_transferred_data(&input[*fed..*fed + take])?;
                *fed += take;
            }

            let drained = self.drain(owner, queue, forwarded)?;
            if *fed == input.len() {
                return Ok(());
            }
            if take == 0 && drained == 0 {
                // Full buffer and nothing decodable.
                return Err(ProtocolError::BufferOverflow {
                    buffered: self.codec.config().io_buffer_size - room,
                    incoming: input.len() - *fed,
                    capacity: self.codec.config().io_buffer_size,
                }
                .into());
            }
        }
    }

    fn drain(
        &mut self,
        owner: ConnectionId,
        queue: &DispatchQueue,
        forwarded: &mut usize,
    ) -> Result<usize, PacketforgeError> {
        let mut drained = 0;
        while let Some(payload) = self.codec.get_packet()? {
            tracing::trace!(%owner, packet_id = payload.packet_id(), "packet decoded");
            queue
                .push(Packet::Data { owner, payload })
                .map_err(|e| self.rejected(e))?;
            drained += 1;
            *forwarded += 1;
        }
        Ok(drained)
    }

    fn rejected(&self, err: DispatchError) -> PacketforgeError {
        match err {
            DispatchError::Closed(packet) => {
                if let Packet::Data { payload, .. } = *packet {
                    self.codec.dispose_packet(payload);
                }
                PacketforgeError::Shutdown
            }
            other => other.into(),
        }
    }

    /// Encodes one payload into a complete frame.
    pub fn encode(&self, payload: &Payload) -> Result<Vec<u8>, ProtocolError> {
        self.codec.encode(payload)
    }

    /// Encodes `payload` and hands the frame to `out` for delivery to
    /// `to`. Returns the frame length.
    pub fn send_request(
        &self,
        to: ConnectionId,
        payload: &Payload,
        out: &dyn Transmit,
    ) -> Result<usize, PacketforgeError> {
        let frame = self.codec.encode(payload)?;
        let len = frame.len();
        out.transmit(to, frame)?;
        tracing::trace!(%to, packet_id = payload.packet_id(), len, "packet sent");
        Ok(len)
    }

    /// Encodes `payload` into `out` and returns the bytes written.
    pub fn get_packet_data(&self, payload: &Payload, out: &mut [u8]) -> Result<usize, ProtocolError> {
        self.codec.get_packet_data(payload, out)
    }

    /// Gives a packet back to the codec (pooled bodies return to their
    /// pool).
    pub fn dispose_packet(&self, payload: Payload) {
        self.codec.dispose_packet(payload);
    }

    /// Clears all decode state, ready for a new connection.
    pub fn reset(&mut self) {
        self.codec.reset();
        self.backlog.clear();
    }

    /// A new adapter with the same codec configuration and pool but no
    /// decode state.
    pub fn fresh(&self) -> Self {
        Self::from_boxed(self.codec.fresh())
    }
}

/// Cloning yields a [`fresh`](ProtocolAdapter::fresh) pipeline: same
/// configuration, empty transfer buffer.
impl Clone for ProtocolAdapter {
    fn clone(&self) -> Self {
        self.fresh()
    }
}

impl std::fmt::Debug for ProtocolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolAdapter")
            .field("codec", &self.codec.name())
            .field("backlog", &self.backlog.len())
            .finish()
    }
}
