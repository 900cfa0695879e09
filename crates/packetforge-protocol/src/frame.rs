//! Frame encoding and decoding: header plus transformed payload.
//!
//! On encode the payload runs through compress → encrypt → checksum;
//! decode undoes it in reverse order. The header always records the
//! transforms that were actually applied, so a payload too small to be
//! worth compressing goes out with the `COMPRESS` bit cleared and the
//! receiver never tries to decompress it.

use std::borrow::Cow;
use std::sync::Arc;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::header::{ChecksumKind, OptionFlags, PacketHeader, MAX_HEADER_SIZE};
use crate::{ProtocolConfig, ProtocolError};

/// Bytes of random nonce prepended to every encrypted payload.
pub const NONCE_SIZE: usize = 24;

/// Bytes of authentication tag appended by the cipher.
pub const TAG_SIZE: usize = 16;

/// Bytes the `ENCRYPT` transform adds on the wire.
pub const ENCRYPT_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Bytes of decompressed-length prefix in a compressed payload.
const SIZE_PREFIX: usize = 4;

/// A complete frame sliced out of the transfer buffer, transforms not
/// yet undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame<'a> {
    /// The parsed header.
    pub header: PacketHeader,
    /// The `data_length` payload bytes exactly as received.
    pub body: &'a [u8],
}

/// Largest wire body a frame with `options` may carry when payloads are
/// limited to `max_packet_size` bytes.
///
/// Compression only ever shrinks a body, so encryption is the one
/// transform that can push a maximal payload past the limit.
pub const fn max_body_len(max_packet_size: usize, options: OptionFlags) -> usize {
    if options.contains(OptionFlags::ENCRYPT) {
        max_packet_size + ENCRYPT_OVERHEAD
    } else {
        max_packet_size
    }
}

/// Computes a frame checksum over `bytes`.
pub fn checksum(kind: ChecksumKind, bytes: &[u8]) -> u32 {
    match kind {
        ChecksumKind::Crc32 => crc32fast::hash(bytes),
        ChecksumKind::Digest => {
            let digest = Sha256::digest(bytes);
            u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
        }
    }
}

/// Applies and removes the per-frame payload transforms.
///
/// Cheap to clone; codec instances for different connections share the
/// cipher.
#[derive(Clone)]
pub struct FrameCodec {
    max_packet_size: usize,
    compression_threshold: usize,
    cipher: Option<Arc<XChaCha20Poly1305>>,
}

impl FrameCodec {
    /// Builds a frame codec from an already-validated config.
    pub fn new(config: &ProtocolConfig) -> Self {
        let cipher = config
            .encryption_key
            .as_ref()
            .map(|key| Arc::new(XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))));
        Self {
            max_packet_size: config.max_packet_size,
            compression_threshold: config.compression_threshold,
            cipher,
        }
    }

    /// Largest application payload a frame may carry, before transforms.
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Returns `true` if an encryption key is configured.
    pub fn can_encrypt(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encodes one frame into a new buffer.
    pub fn encode(
        &self,
        packet_id: u16,
        options: OptionFlags,
        payload: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::with_capacity(MAX_HEADER_SIZE + payload.len());
        self.encode_into(packet_id, options, payload, &mut out)?;
        Ok(out)
    }

    /// Appends one frame (`header || transformed payload`) to `out`.
    ///
    /// Returns the number of bytes appended. Nothing is appended on
    /// error.
    ///
    /// # Errors
    /// - [`ProtocolError::Header`] if `options` is not a valid flag set.
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds the
    ///   maximum packet size.
    /// - [`ProtocolError::Encryption`] if encryption is requested but no
    ///   key is configured.
    pub fn encode_into(
        &self,
        packet_id: u16,
        options: OptionFlags,
        payload: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<usize, ProtocolError> {
        if !options.is_valid() {
            return Err(ProtocolError::Header(format!(
                "cannot encode with option flags {options}"
            )));
        }
        check_len(payload.len(), self.max_packet_size)?;

        let mut applied = options;
        let mut body = Cow::Borrowed(payload);

        if options.contains(OptionFlags::COMPRESS) {
            match self.compress(payload) {
                Some(compressed) => body = Cow::Owned(compressed),
                None => applied = applied.without(OptionFlags::COMPRESS),
            }
        }

        if options.contains(OptionFlags::ENCRYPT) {
            body = Cow::Owned(self.encrypt(&body)?);
        }

        check_len(body.len(), max_body_len(self.max_packet_size, applied))?;

        let checksum = if applied.has_checksum() {
            checksum(applied.checksum_kind(), &body)
        } else {
            0
        };
        let header = PacketHeader {
            packet_id,
            options: applied,
            checksum,
            // check_len bounds this by MAX_PACKET_SIZE plus the cipher
            // overhead, well inside u16.
            data_length: body.len() as u16,
        };

        header.write_to(out);
        out.extend_from_slice(&body);
        tracing::trace!(packet_id, options = %applied, len = body.len(), "frame encoded");
        Ok(header.encoded_len() + body.len())
    }

    /// Verifies and reverses the transforms on a received frame.
    ///
    /// Borrows from `frame.body` when no transform needs undoing.
    pub fn decode<'a>(&self, frame: &RawFrame<'a>) -> Result<Cow<'a, [u8]>, ProtocolError> {
        let header = &frame.header;
        let body = frame.body;
        check_len(body.len(), max_body_len(self.max_packet_size, header.options))?;

        if header.options.has_checksum() {
            let actual = checksum(header.options.checksum_kind(), body);
            if actual != header.checksum {
                return Err(ProtocolError::ChecksumMismatch {
                    expected: header.checksum,
                    actual,
                });
            }
        }

        let mut data = Cow::Borrowed(body);
        if header.options.contains(OptionFlags::ENCRYPT) {
            data = Cow::Owned(self.decrypt(&data)?);
        }
        if header.options.contains(OptionFlags::COMPRESS) {
            data = Cow::Owned(self.decompress(&data)?);
        }
        Ok(data)
    }

    /// Compresses `payload` if it is over the threshold and compression
    /// actually shrinks it.
    fn compress(&self, payload: &[u8]) -> Option<Vec<u8>> {
        if payload.len() <= self.compression_threshold {
            return None;
        }
        let compressed = lz4_flex::compress_prepend_size(payload);
        (compressed.len() < payload.len()).then_some(compressed)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if data.len() < SIZE_PREFIX {
            return Err(ProtocolError::Decompression("missing size prefix".into()));
        }
        // Check the declared size before lz4 allocates for it.
        let declared = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if declared > self.max_packet_size {
            return Err(ProtocolError::Decompression(format!(
                "declared size {declared} exceeds maximum packet size {}",
                self.max_packet_size
            )));
        }
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| ProtocolError::Decompression(e.to_string()))
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| ProtocolError::Encryption("no encryption key configured".into()))?;

        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill(&mut nonce);
        let sealed = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| ProtocolError::Encryption("cipher rejected payload".into()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| ProtocolError::Decryption("no encryption key configured".into()))?;
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ProtocolError::Decryption(format!(
                "{} bytes is shorter than nonce and tag",
                data.len()
            )));
        }
        let (nonce, sealed) = data.split_at(NONCE_SIZE);
        cipher
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map_err(|_| ProtocolError::Decryption("authentication tag mismatch".into()))
    }
}

fn check_len(len: usize, max: usize) -> Result<(), ProtocolError> {
    if len > max {
        return Err(ProtocolError::PayloadTooLarge { len, max });
    }
    Ok(())
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("max_packet_size", &self.max_packet_size)
            .field("compression_threshold", &self.compression_threshold)
            .field("encrypts", &self.cipher.is_some())
            .finish()
    }
}
