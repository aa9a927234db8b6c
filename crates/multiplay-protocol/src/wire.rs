//! The [`WireFormat`] trait: one write/read pair per wire value.
//!
//! Every payload codec in this crate is an implementation of this trait,
//! and each pair must round-trip exactly: `read(write(x)) == x`.

use crate::bitstream::{BitReader, BitWriter, RawBits};
use crate::ProtocolError;

/// A value with a fixed bit-level encoding.
pub trait WireFormat: Sized {
    fn write(&self, writer: &mut BitWriter);
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError>;
}

impl WireFormat for bool {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_bool(*self);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        reader.read_bool()
    }
}

impl WireFormat for u8 {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u8(*self);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        reader.read_u8()
    }
}

impl WireFormat for u16 {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u16(*self);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        reader.read_u16()
    }
}

impl WireFormat for u32 {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(*self);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        reader.read_u32()
    }
}

impl WireFormat for u64 {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u64(*self);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        reader.read_u64()
    }
}

impl WireFormat for i32 {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_i32(*self);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        reader.read_i32()
    }
}

impl WireFormat for f32 {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_f32(*self);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        reader.read_f32()
    }
}

impl WireFormat for String {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_string(self);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        reader.read_string()
    }
}

/// Lists are a variable-width element count followed by the elements.
impl<T: WireFormat> WireFormat for Vec<T> {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_var_u32(self.len() as u32);
        for item in self {
            item.write(writer);
        }
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let len = reader.read_len()?;
        // Each element costs at least one bit, which bounds the allocation
        // by the frame size rather than by the declared count.
        if len as u32 > reader.remaining_bits() {
            return Err(ProtocolError::Truncated {
                needed: len as u32,
                available: reader.remaining_bits(),
            });
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }
}

/// Options are a presence bit followed by the value.
impl<T: WireFormat> WireFormat for Option<T> {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_bool(self.is_some());
        if let Some(value) = self {
            value.write(writer);
        }
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        if reader.read_bool()? {
            Ok(Some(T::read(reader)?))
        } else {
            Ok(None)
        }
    }
}

/// Raw blocks carry a 32-bit bit-length prefix.
impl WireFormat for RawBits {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.bit_len());
        writer.write_raw(self);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let bit_len = reader.read_u32()?;
        reader.read_raw(bit_len)
    }
}

/// Writes `value` into a fresh block. Convenience for tests and for
/// layers that embed one payload inside another.
pub fn to_raw<T: WireFormat>(value: &T) -> RawBits {
    let mut writer = BitWriter::new();
    value.write(&mut writer);
    writer.into_raw()
}

/// Reads a `T` that must occupy `raw` exactly.
pub fn from_raw<T: WireFormat>(raw: &RawBits) -> Result<T, ProtocolError> {
    let mut reader = raw.reader();
    let value = T::read(&mut reader)?;
    if !reader.is_exhausted() {
        return Err(ProtocolError::InvalidValue(format!(
            "{} trailing bits after payload",
            reader.remaining_bits()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_round_trip() {
        let raw = to_raw(&Vec::<u32>::new());
        assert_eq!(raw.bit_len(), 8);
        assert_eq!(from_raw::<Vec<u32>>(&raw).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn test_option_round_trip() {
        assert_eq!(from_raw::<Option<u16>>(&to_raw(&Some(9u16))).unwrap(), Some(9));
        assert_eq!(from_raw::<Option<u16>>(&to_raw(&None::<u16>)).unwrap(), None);
    }

    #[test]
    fn test_list_count_larger_than_data_is_rejected() {
        let mut w = BitWriter::new();
        w.write_var_u32(1000);
        w.write_u8(1);
        let raw = w.into_raw();
        assert!(from_raw::<Vec<u8>>(&raw).is_err());
    }

    #[test]
    fn test_trailing_bits_are_rejected() {
        let mut w = BitWriter::new();
        w.write_u8(1);
        w.write_bit(true);
        assert!(from_raw::<u8>(&w.into_raw()).is_err());
    }
}
