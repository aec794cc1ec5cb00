//! Packet buffer and frame codec
//!
//! Every frame on the wire, on both the player and the world-server link, is
//! laid out as:
//!
//! ```text
//! [u16 LE total length (includes these 2 bytes)][u8 opcode][payload ...]
//! ```
//!
//! All integers inside payloads are little-endian. Strings are sequences of
//! UTF-16LE code units terminated by a zero code unit.
//!
//! Reads never zero-fill: reading past the end of the buffer returns
//! [`ProtocolError::InsufficientData`] and leaves the read position
//! untouched, and a string with no terminator inside the buffer returns
//! [`ProtocolError::UnterminatedString`].

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;

/// Maximum frame size (the length prefix is a u16)
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Smallest legal frame: length prefix plus opcode
pub const MIN_FRAME_SIZE: usize = LENGTH_PREFIX_SIZE + 1;

type DecodeResult<T> = std::result::Result<T, ProtocolError>;

/// Encode a plain frame from an opcode and payload
pub fn encode_frame(opcode: u8, payload: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut body = Vec::with_capacity(1 + payload.len());
    body.push(opcode);
    body.extend_from_slice(payload);
    wrap_frame(&body)
}

/// Prefix an already-assembled (possibly encrypted) body with its length
pub fn wrap_frame(body: &[u8]) -> DecodeResult<Vec<u8>> {
    let total = body.len() + LENGTH_PREFIX_SIZE;
    if total > MAX_PACKET_SIZE {
        return Err(ProtocolError::PacketTooLarge {
            size: total,
            max: MAX_PACKET_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&(total as u16).to_le_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Decode a complete plain frame into its opcode and payload
pub fn decode_frame(frame: &[u8]) -> DecodeResult<(u8, Vec<u8>)> {
    if frame.len() < MIN_FRAME_SIZE {
        return Err(ProtocolError::InvalidPacketSize {
            expected: MIN_FRAME_SIZE,
            actual: frame.len(),
        });
    }

    let declared = u16::from_le_bytes([frame[0], frame[1]]) as usize;
    if declared < MIN_FRAME_SIZE {
        return Err(ProtocolError::InvalidPacketSize {
            expected: MIN_FRAME_SIZE,
            actual: declared,
        });
    }
    if declared > frame.len() {
        return Err(ProtocolError::InsufficientData {
            expected: declared,
            actual: frame.len(),
        });
    }

    split_body(&frame[LENGTH_PREFIX_SIZE..declared])
}

/// Split a decrypted body into opcode and payload
pub fn split_body(body: &[u8]) -> DecodeResult<(u8, Vec<u8>)> {
    match body.split_first() {
        Some((&opcode, payload)) => Ok((opcode, payload.to_vec())),
        None => Err(ProtocolError::EmptyPacket),
    }
}

/// Packet buffer for reading and writing little-endian protocol data
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            read_pos: 0,
        }
    }

    // ============ Properties ============

    /// Get the current read position
    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning its bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Reset read position to start
    pub fn reset(&mut self) {
        self.read_pos = 0;
    }

    fn take(&mut self, count: usize) -> DecodeResult<&[u8]> {
        let remaining = self.remaining();
        if remaining < count {
            return Err(ProtocolError::InsufficientData {
                expected: count,
                actual: remaining,
            });
        }
        let start = self.read_pos;
        self.read_pos += count;
        Ok(&self.data[start..start + count])
    }

    fn take_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    // ============ Reading Methods ============

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read an unsigned little-endian short
    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    /// Read an unsigned little-endian int
    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Read an unsigned little-endian long
    pub fn read_u64(&mut self) -> DecodeResult<u64> {
        self.take_array().map(u64::from_le_bytes)
    }

    /// Read a fixed-size byte array
    pub fn read_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        self.take_array()
    }

    /// Read `count` raw bytes
    pub fn read_bytes(&mut self, count: usize) -> DecodeResult<Vec<u8>> {
        self.take(count).map(<[u8]>::to_vec)
    }

    /// Read a zero-terminated UTF-16LE string.
    ///
    /// The read position only advances when a terminator is found.
    pub fn read_string(&mut self) -> DecodeResult<String> {
        let rest = &self.data[self.read_pos..];
        let mut units = Vec::new();
        let mut consumed = 0;

        for pair in rest.chunks_exact(2) {
            consumed += 2;
            let unit = u16::from_le_bytes([pair[0], pair[1]]);
            if unit == 0 {
                self.read_pos += consumed;
                return Ok(String::from_utf16_lossy(&units));
            }
            units.push(unit);
        }

        Err(ProtocolError::UnterminatedString)
    }

    // ============ Writing Methods ============

    /// Write an unsigned byte
    pub fn write_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Write an unsigned little-endian short
    pub fn write_u16(&mut self, value: u16) {
        self.data.put_u16_le(value);
    }

    /// Write an unsigned little-endian int
    pub fn write_u32(&mut self, value: u32) {
        self.data.put_u32_le(value);
    }

    /// Write an unsigned little-endian long
    pub fn write_u64(&mut self, value: u64) {
        self.data.put_u64_le(value);
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.put_slice(bytes);
    }

    /// Write a zero-terminated UTF-16LE string
    pub fn write_string(&mut self, value: &str) {
        for unit in value.encode_utf16() {
            self.data.put_u16_le(unit);
        }
        self.data.put_u16_le(0);
    }
}

impl From<&[u8]> for PacketBuffer {
    fn from(slice: &[u8]) -> Self {
        Self::from_bytes(slice)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
