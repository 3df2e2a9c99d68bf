//! Variable-length and fixed-width integer encoding.
//!
//! Multi-byte integers (`mb_u_int32` in the WMLScript binary format) carry
//! seven data bits per byte, most-significant group first. Every byte except
//! the last has its high bit set:
//!
//! ```text
//! 0x7f        -> 7f
//! 0x80        -> 81 00
//! 0x3fff      -> ff 7f
//! 0xffffffff  -> 8f ff ff ff 7f
//! ```
//!
//! Fixed-width integers are big-endian.

use super::DecodeError;

/// Maximum encoded length of a `u32`.
pub const MAX_VARINT_LEN: usize = 5;

/// Encodes `value` into a stack buffer, returning the buffer and the number
/// of bytes used. The encoded bytes are `buf[..len]`.
pub fn encode_varint(mut value: u32) -> ([u8; MAX_VARINT_LEN], usize) {
    let mut scratch = [0u8; MAX_VARINT_LEN];
    let mut pos = MAX_VARINT_LEN - 1;

    scratch[pos] = (value & 0x7f) as u8;
    value >>= 7;
    while value != 0 {
        pos -= 1;
        scratch[pos] = 0x80 | (value & 0x7f) as u8;
        value >>= 7;
    }

    let len = MAX_VARINT_LEN - pos;
    let mut out = [0u8; MAX_VARINT_LEN];
    out[..len].copy_from_slice(&scratch[pos..]);
    (out, len)
}

/// Number of bytes `value` occupies when varint-encoded.
pub fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

/// Appends the varint encoding of `value` to `buf`.
pub fn write_varint(buf: &mut Vec<u8>, value: u32) {
    let (bytes, len) = encode_varint(value);
    buf.extend_from_slice(&bytes[..len]);
}

/// Growable big-endian output buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer, returning the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a byte.
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    /// Writes a signed byte.
    pub fn i8(&mut self, value: i8) -> &mut Self {
        self.buffer.push(value as u8);
        self
    }

    /// Writes a big-endian `u16`.
    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Writes a big-endian `i16`.
    pub fn i16(&mut self, value: i16) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Writes a big-endian `u32`.
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Writes a big-endian `i32`.
    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Writes a multi-byte unsigned integer.
    pub fn varint(&mut self, value: u32) -> &mut Self {
        write_varint(&mut self.buffer, value);
        self
    }

    /// Writes raw bytes.
    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }
}

/// Cursor over an input buffer. Every read is bounds checked.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true once every byte has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated { offset: self.pos });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads a byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a signed byte.
    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Reads a multi-byte unsigned integer.
    pub fn read_varint(&mut self) -> Result<u32, DecodeError> {
        let start = self.pos;
        let mut value: u64 = 0;

        for _ in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            value = (value << 7) | u64::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                return u32::try_from(value).map_err(|_| DecodeError::VarintTooLong { offset: start });
            }
        }

        Err(DecodeError::VarintTooLong { offset: start })
    }

    /// Reads a varint that must fit in 16 bits.
    pub fn read_varint_u16(&mut self) -> Result<u16, DecodeError> {
        let offset = self.pos;
        let value = self.read_varint()?;
        u16::try_from(value).map_err(|_| DecodeError::ValueOutOfRange { offset, value })
    }
}
