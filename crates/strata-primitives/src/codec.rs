//! Deterministic binary encoding.
//!
//! Every consensus-visible record (blocks, transactions, events, token
//! content, tasks) is written field by field in a fixed order using
//! length-prefixed strings and byte arrays and variable-length integers.
//! The varint layout is one byte below `0xFD`, otherwise a marker byte
//! followed by a little-endian u16 (`0xFD`), u32 (`0xFE`) or u64 (`0xFF`).

use crate::{Address, Hash};
use thiserror::Error;

/// Decoding errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended early
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    /// Input had bytes left after a full decode
    #[error("trailing bytes: {0}")]
    TrailingBytes(usize),

    /// Structurally invalid data
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Types with a canonical binary form
pub trait Serializable: Sized {
    /// Append the canonical encoding to `writer`
    fn serialize(&self, writer: &mut BinaryWriter);

    /// Read a value from `reader`
    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self>;

    /// Encode into a fresh buffer
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.serialize(&mut writer);
        writer.into_bytes()
    }

    /// Decode from a buffer that must be consumed entirely
    fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let mut reader = BinaryReader::new(bytes);
        let value = Self::unserialize(&mut reader)?;
        if !reader.is_empty() {
            return Err(CodecError::TrailingBytes(reader.remaining()));
        }
        Ok(value)
    }
}

/// Growable output buffer
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the writer and return its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing was written yet
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a single byte
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a boolean as one byte
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Write a little-endian u16
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian u32
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian u64
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a variable-length unsigned integer
    pub fn write_varint(&mut self, value: u64) {
        if value < 0xFD {
            self.buf.push(value as u8);
        } else if value <= 0xFFFF {
            self.buf.push(0xFD);
            self.write_u16(value as u16);
        } else if value <= 0xFFFF_FFFF {
            self.buf.push(0xFE);
            self.write_u32(value as u32);
        } else {
            self.buf.push(0xFF);
            self.write_u64(value);
        }
    }

    /// Write a signed 128-bit integer as minimal two's complement bytes
    pub fn write_bigint(&mut self, value: i128) {
        let bytes = value.to_le_bytes();
        let mut len = bytes.len();
        while len > 1 {
            let top = bytes[len - 1];
            let next_sign = bytes[len - 2] & 0x80;
            if (top == 0x00 && next_sign == 0) || (top == 0xFF && next_sign != 0) {
                len -= 1;
            } else {
                break;
            }
        }
        self.write_bytes(&bytes[..len]);
    }

    /// Write raw bytes with no length prefix
    pub fn write_fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a length-prefixed byte array
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Write an address
    pub fn write_address(&mut self, address: &Address) {
        self.buf.extend_from_slice(address.as_bytes());
    }

    /// Write a hash
    pub fn write_hash(&mut self, hash: &Hash) {
        self.buf.extend_from_slice(hash.as_bytes());
    }

    /// Write a nested serializable value
    pub fn write<T: Serializable>(&mut self, value: &T) {
        value.serialize(self);
    }

    /// Write a count-prefixed sequence
    pub fn write_list<T: Serializable>(&mut self, items: &[T]) {
        self.write_varint(items.len() as u64);
        for item in items {
            item.serialize(self);
        }
    }
}

/// Cursor over an input buffer
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a reader at offset zero
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the whole input was consumed
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(CodecError::UnexpectedEof(self.pos))?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof(self.pos));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a boolean byte
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidData(format!("invalid bool byte {other}"))),
        }
    }

    /// Read a little-endian u16
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian u32
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian u64
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Read a variable-length unsigned integer
    pub fn read_varint(&mut self) -> CodecResult<u64> {
        match self.read_u8()? {
            0xFD => Ok(self.read_u16()? as u64),
            0xFE => Ok(self.read_u32()? as u64),
            0xFF => self.read_u64(),
            small => Ok(small as u64),
        }
    }

    /// Read a varint that must fit a collection length
    pub fn read_len(&mut self) -> CodecResult<usize> {
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(CodecError::InvalidData(format!(
                "length {len} exceeds remaining input {}",
                self.remaining()
            )));
        }
        Ok(len as usize)
    }

    /// Read a two's complement integer written by [`BinaryWriter::write_bigint`]
    pub fn read_bigint(&mut self) -> CodecResult<i128> {
        let bytes = self.read_bytes()?;
        if bytes.is_empty() || bytes.len() > 16 {
            return Err(CodecError::InvalidData(format!(
                "invalid integer width {}",
                bytes.len()
            )));
        }
        let fill = if bytes[bytes.len() - 1] & 0x80 != 0 { 0xFF } else { 0x00 };
        let mut buf = [fill; 16];
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(i128::from_le_bytes(buf))
    }

    /// Read `len` raw bytes
    pub fn read_fixed(&mut self, len: usize) -> CodecResult<Vec<u8>> {
        Ok(self.take(len)?.to_vec())
    }

    /// Read a length-prefixed byte array
    pub fn read_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> CodecResult<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| CodecError::InvalidData(e.to_string()))
    }

    /// Read an address
    pub fn read_address(&mut self) -> CodecResult<Address> {
        let bytes: [u8; 33] = self.take_array()?;
        Address::from_bytes(bytes).map_err(|e| CodecError::InvalidData(e.to_string()))
    }

    /// Read a hash
    pub fn read_hash(&mut self) -> CodecResult<Hash> {
        Ok(Hash::from_bytes(self.take_array()?))
    }

    /// Read a nested serializable value
    pub fn read<T: Serializable>(&mut self) -> CodecResult<T> {
        T::unserialize(self)
    }

    /// Read a count-prefixed sequence
    pub fn read_list<T: Serializable>(&mut self) -> CodecResult<Vec<T>> {
        let count = self.read_len()?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::unserialize(self)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_varint_boundaries() {
        let cases: [(u64, usize); 7] = [
            (0, 1),
            (0xFC, 1),
            (0xFD, 3),
            (0xFFFF, 3),
            (0x1_0000, 5),
            (0xFFFF_FFFF, 5),
            (0x1_0000_0000, 9),
        ];
        for (value, width) in cases {
            let mut writer = BinaryWriter::new();
            writer.write_varint(value);
            assert_eq!(writer.len(), width, "width of {value:#x}");
            let bytes = writer.into_bytes();
            assert_eq!(BinaryReader::new(&bytes).read_varint().unwrap(), value);
        }
    }

    #[test]
    fn test_bigint_minimal_width() {
        let mut writer = BinaryWriter::new();
        writer.write_bigint(0);
        writer.write_bigint(-1);
        writer.write_bigint(128);
        let bytes = writer.into_bytes();
        // len + 1 byte, len + 1 byte, len + 2 bytes
        assert_eq!(bytes, vec![1, 0x00, 1, 0xFF, 2, 0x80, 0x00]);
    }

    #[test]
    fn test_eof_reported() {
        let mut reader = BinaryReader::new(&[0x05, 1, 2]);
        assert_eq!(
            reader.read_bytes(),
            Err(CodecError::InvalidData(
                "length 5 exceeds remaining input 2".to_string()
            ))
        );
        let mut reader = BinaryReader::new(&[1, 2]);
        assert_eq!(reader.read_u32(), Err(CodecError::UnexpectedEof(0)));
    }

    #[test]
    fn test_invalid_bool() {
        let mut reader = BinaryReader::new(&[2]);
        assert!(reader.read_bool().is_err());
    }

    #[test]
    fn test_string() {
        let mut writer = BinaryWriter::new();
        writer.write_string("nexus");
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 5);
        assert_eq!(BinaryReader::new(&bytes).read_string().unwrap(), "nexus");
    }

    proptest! {
        #[test]
        fn prop_bigint_roundtrip(value in any::<i128>()) {
            let mut writer = BinaryWriter::new();
            writer.write_bigint(value);
            let bytes = writer.into_bytes();
            prop_assert_eq!(BinaryReader::new(&bytes).read_bigint().unwrap(), value);
        }

        #[test]
        fn prop_varint_roundtrip(value in any::<u64>()) {
            let mut writer = BinaryWriter::new();
            writer.write_varint(value);
            let bytes = writer.into_bytes();
            prop_assert_eq!(BinaryReader::new(&bytes).read_varint().unwrap(), value);
        }
    }
}
