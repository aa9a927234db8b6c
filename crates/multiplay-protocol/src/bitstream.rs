//! Bit-level stream primitives.
//!
//! Bits are packed least-significant first inside each byte, and multi-bit
//! values are written least-significant bit first. A [`BitReader`] is
//! always bounded by a declared bit length, so a corrupt length prefix can
//! never make it read past the end of the frame.

use crate::ProtocolError;

/// Longest string or list accepted by the readers.
pub const MAX_DECLARED_LEN: u32 = 64 * 1024;

/// Groups of value bits in a variable-width integer.
const VAR_GROUP_BITS: u8 = 7;

/// Growable bit writer.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    buffer: Vec<u8>,
    bits: u32,
}

impl BitWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far.
    pub fn bits_written(&self) -> u32 {
        self.bits
    }

    pub fn write_bit(&mut self, bit: bool) {
        let offset = self.bits % 8;
        if offset == 0 {
            self.buffer.push(0);
        }
        if bit {
            if let Some(last) = self.buffer.last_mut() {
                *last |= 1 << offset;
            }
        }
        self.bits += 1;
    }

    /// Writes the low `count` bits of `value`.
    pub fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32);
        for i in 0..count {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bit(value);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bits(value as u32, 8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bits(value as u32, 16);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bits(value, 32);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_u32(value as u32);
        self.write_u32((value >> 32) as u32);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Writes `value` in groups of 7 bits, each preceded by a
    /// "more groups follow" bit. Small values cost 8 bits.
    pub fn write_var_u32(&mut self, mut value: u32) {
        loop {
            let more = value >= 1 << VAR_GROUP_BITS;
            self.write_bit(more);
            self.write_bits(value & ((1 << VAR_GROUP_BITS) - 1), VAR_GROUP_BITS);
            value >>= VAR_GROUP_BITS;
            if !more {
                return;
            }
        }
    }

    /// Writes a raw byte block (no length prefix).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bits % 8 == 0 {
            self.buffer.extend_from_slice(bytes);
            self.bits += bytes.len() as u32 * 8;
        } else {
            for &b in bytes {
                self.write_u8(b);
            }
        }
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_var_u32(value.len() as u32);
        self.write_bytes(value.as_bytes());
    }

    /// Appends every bit of `raw` (no length prefix).
    pub fn write_raw(&mut self, raw: &RawBits) {
        let mut reader = raw.reader();
        while let Ok(bit) = reader.read_bit() {
            self.write_bit(bit);
        }
    }

    /// Consumes the writer, returning the packed bytes (last byte
    /// zero-padded).
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Consumes the writer, keeping the exact bit length.
    pub fn into_raw(self) -> RawBits {
        RawBits {
            bit_len: self.bits,
            bytes: self.buffer,
        }
    }
}

/// A block of bits with an exact length.
///
/// Used for payloads that are written by one layer and interpreted by
/// another (the map cache body of `DATA_UPDATE`, handler-owned messages,
/// relayed frames).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBits {
    bytes: Vec<u8>,
    bit_len: u32,
}

impl RawBits {
    /// Wraps whole bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let bit_len = bytes.len() as u32 * 8;
        Self { bytes, bit_len }
    }

    pub fn bit_len(&self) -> u32 {
        self.bit_len
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns a reader bounded to exactly these bits.
    pub fn reader(&self) -> BitReader<'_> {
        BitReader {
            data: &self.bytes,
            pos: 0,
            end: self.bit_len,
        }
    }
}

/// Cursor over a bounded bit range.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: u32,
    end: u32,
}

impl<'a> BitReader<'a> {
    /// Reads every bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len() as u32 * 8,
        }
    }

    /// Reads only the first `bit_len` bits of `data`.
    pub fn with_limit(data: &'a [u8], bit_len: u32) -> Result<Self, ProtocolError> {
        let available = data.len() as u32 * 8;
        if bit_len > available {
            return Err(ProtocolError::Truncated {
                needed: bit_len,
                available,
            });
        }
        Ok(Self {
            data,
            pos: 0,
            end: bit_len,
        })
    }

    pub fn position(&self) -> u32 {
        self.pos
    }

    pub fn remaining_bits(&self) -> u32 {
        self.end - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.end
    }

    fn ensure(&self, needed: u32) -> Result<(), ProtocolError> {
        if needed > self.remaining_bits() {
            return Err(ProtocolError::Truncated {
                needed,
                available: self.remaining_bits(),
            });
        }
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool, ProtocolError> {
        self.ensure(1)?;
        let byte = self.data[(self.pos / 8) as usize];
        let bit = (byte >> (self.pos % 8)) & 1 != 0;
        self.pos += 1;
        Ok(bit)
    }

    /// Reads `count` bits into the low bits of a `u32`.
    pub fn read_bits(&mut self, count: u8) -> Result<u32, ProtocolError> {
        debug_assert!(count <= 32);
        self.ensure(count as u32)?;
        let mut value = 0u32;
        for i in 0..count {
            if self.read_bit()? {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        self.read_bit()
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.read_bits(32)
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        let low = self.read_u32()? as u64;
        let high = self.read_u32()? as u64;
        Ok(low | (high << 32))
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_var_u32(&mut self) -> Result<u32, ProtocolError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let more = self.read_bit()?;
            let group = self.read_bits(VAR_GROUP_BITS)? as u64;
            value |= group << shift;
            shift += VAR_GROUP_BITS as u32;
            if value > u32::MAX as u64 {
                return Err(ProtocolError::InvalidValue(
                    "variable integer exceeds 32 bits".into(),
                ));
            }
            if !more {
                return Ok(value as u32);
            }
            if shift >= 35 {
                return Err(ProtocolError::InvalidValue(
                    "variable integer has too many groups".into(),
                ));
            }
        }
    }

    /// Reads a declared length and checks it against [`MAX_DECLARED_LEN`].
    pub fn read_len(&mut self) -> Result<usize, ProtocolError> {
        let len = self.read_var_u32()?;
        if len > MAX_DECLARED_LEN {
            return Err(ProtocolError::LengthOverflow(len));
        }
        Ok(len as usize)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        self.ensure(len as u32 * 8)?;
        if self.pos % 8 == 0 {
            let start = (self.pos / 8) as usize;
            self.pos += len as u32 * 8;
            return Ok(self.data[start..start + len].to_vec());
        }
        (0..len).map(|_| self.read_u8()).collect()
    }

    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes)
            .map_err(|e| ProtocolError::InvalidValue(format!("string is not utf-8: {e}")))
    }

    /// Copies the next `bit_len` bits into a standalone block.
    pub fn read_raw(&mut self, bit_len: u32) -> Result<RawBits, ProtocolError> {
        self.ensure(bit_len)?;
        let mut writer = BitWriter::new();
        for _ in 0..bit_len {
            writer.write_bit(self.read_bit()?);
        }
        Ok(writer.into_raw())
    }

    /// Skips `bit_len` bits.
    pub fn skip(&mut self, bit_len: u32) -> Result<(), ProtocolError> {
        self.ensure(bit_len)?;
        self.pos += bit_len;
        Ok(())
    }
}
