//! Binary primitive codec shared by the compound-file writer and the record
//! encoders that feed it.
//!
//! [`BinaryWriter`] emits fixed-width integers, IEEE floats, padding runs and
//! encoded strings to any [`Write`] sink; [`BinaryReader`] performs the
//! inverse over a byte slice. Both honour a [`ByteOrder`] and a
//! [`StringEncoding`] (UTF-16 by default).

use crate::common::encoding::StringEncoding;
use std::io::Write;
use thiserror::Error;
use zerocopy::{BE, F32, F64, FromBytes, I16, I32, I64, IntoBytes, LE, U16, U32, U64};

/// Binary codec error type
#[derive(Error, Debug)]
pub enum BinaryError {
    /// Not enough data to read the requested type
    #[error("Unexpected end of data: expected {expected}, got {available}")]
    UnexpectedEndOfData { expected: usize, available: usize },

    /// A value does not fit the field it is written into
    #[error("Overflow: {0}")]
    Overflow(String),

    /// A string contains characters the target encoding cannot represent
    #[error("'{text}' cannot be represented in {encoding}")]
    Unrepresentable { text: String, encoding: &'static str },

    /// Input bytes are not valid in the expected encoding
    #[error("Malformed data: {0}")]
    Malformed(String),

    /// The underlying sink failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for binary operations
pub type BinaryResult<T> = Result<T, BinaryError>;

/// Byte order of multi-byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Least significant byte first (the only order compound files use)
    #[default]
    LittleEndian,
    /// Most significant byte first
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub(crate) fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            Self::LittleEndian => value.to_le_bytes(),
            Self::BigEndian => value.to_be_bytes(),
        }
    }

    #[inline]
    pub(crate) fn u16_from(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::LittleEndian => u16::from_le_bytes(bytes),
            Self::BigEndian => u16::from_be_bytes(bytes),
        }
    }
}

macro_rules! write_fixed {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $wire:ident) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(&mut self, value: $ty) -> BinaryResult<()> {
            match self.order {
                ByteOrder::LittleEndian => self.put($wire::<LE>::new(value).as_bytes()),
                ByteOrder::BigEndian => self.put($wire::<BE>::new(value).as_bytes()),
            }
        }
    };
}

macro_rules! read_fixed {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $wire:ident) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(&mut self) -> BinaryResult<$ty> {
            let bytes = self.take(std::mem::size_of::<$ty>())?;
            let malformed =
                || BinaryError::Malformed(concat!("failed to read ", stringify!($ty)).to_string());
            match self.order {
                ByteOrder::LittleEndian => $wire::<LE>::read_from_bytes(bytes)
                    .map(|v| v.get())
                    .map_err(|_| malformed()),
                ByteOrder::BigEndian => $wire::<BE>::read_from_bytes(bytes)
                    .map(|v| v.get())
                    .map_err(|_| malformed()),
            }
        }
    };
}

/// Writes binary primitives to a sink.
///
/// # Examples
///
/// ```
/// use longan::common::binary::{BinaryWriter, ByteOrder};
///
/// let mut writer = BinaryWriter::new(Vec::new());
/// writer.write_u16(0x1234).unwrap();
/// writer.write_repeated(2, 0xFF).unwrap();
/// assert_eq!(writer.into_inner(), vec![0x34, 0x12, 0xFF, 0xFF]);
///
/// let mut writer = BinaryWriter::new(Vec::new()).with_byte_order(ByteOrder::BigEndian);
/// writer.write_u16(0x1234).unwrap();
/// assert_eq!(writer.into_inner(), vec![0x12, 0x34]);
/// ```
#[derive(Debug)]
pub struct BinaryWriter<W: Write> {
    inner: W,
    order: ByteOrder,
    encoding: StringEncoding,
    written: u64,
}

impl<W: Write> BinaryWriter<W> {
    /// Create a little-endian, UTF-16 writer over `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            order: ByteOrder::LittleEndian,
            encoding: StringEncoding::Utf16,
            written: 0,
        }
    }

    /// Use `order` for every subsequent multi-byte value.
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// Use `encoding` for every subsequent string.
    pub fn with_encoding(mut self, encoding: StringEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Byte order in effect.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> u64 {
        self.written
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the underlying sink.
    pub fn into_inner(self) -> W {
        self.inner
    }

    #[inline]
    fn put(&mut self, bytes: &[u8]) -> BinaryResult<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Write a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> BinaryResult<()> {
        self.put(&[value])
    }

    /// Write a single signed byte.
    #[inline]
    pub fn write_i8(&mut self, value: i8) -> BinaryResult<()> {
        self.put(&value.to_ne_bytes())
    }

    write_fixed!(
        /// Write a 16-bit unsigned integer.
        write_u16, u16, U16
    );
    write_fixed!(
        /// Write a 16-bit signed integer.
        write_i16, i16, I16
    );
    write_fixed!(
        /// Write a 32-bit unsigned integer.
        write_u32, u32, U32
    );
    write_fixed!(
        /// Write a 32-bit signed integer.
        write_i32, i32, I32
    );
    write_fixed!(write_u64, u64, U64);
    write_fixed!(write_i64, i64, I64);
    write_fixed!(
        /// Write an IEEE 754 single-precision float.
        write_f32, f32, F32
    );
    write_fixed!(
        /// Write an IEEE 754 double-precision float.
        write_f64, f64, F64
    );

    /// Write raw bytes unchanged.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> BinaryResult<()> {
        self.put(bytes)
    }

    /// Write `count` copies of `value`.
    pub fn write_repeated(&mut self, count: usize, value: u8) -> BinaryResult<()> {
        const CHUNK: usize = 512;
        let block = [value; CHUNK];
        let mut left = count;
        while left > 0 {
            let n = left.min(CHUNK);
            self.put(&block[..n])?;
            left -= n;
        }
        Ok(())
    }

    /// Write `text` in the writer's encoding, returning the bytes written.
    pub fn write_string(&mut self, text: &str) -> BinaryResult<usize> {
        let bytes = self.encoding.encode(text, self.order)?;
        self.put(&bytes)?;
        Ok(bytes.len())
    }

    /// Write a 16-bit code-unit count followed by the encoded string.
    pub fn write_prefixed_string(&mut self, text: &str) -> BinaryResult<()> {
        let bytes = self.encoding.encode(text, self.order)?;
        let units = bytes.len() / self.encoding.code_unit_size();
        let units = u16::try_from(units).map_err(|_| {
            BinaryError::Overflow(format!("string of {} code units exceeds u16 prefix", units))
        })?;
        self.write_u16(units)?;
        self.put(&bytes)
    }

    /// Write the encoded string padded with `fill` to exactly `width` bytes.
    pub fn write_fixed_string(&mut self, text: &str, width: usize, fill: u8) -> BinaryResult<()> {
        let bytes = self.encoding.encode(text, self.order)?;
        if bytes.len() > width {
            return Err(BinaryError::Overflow(format!(
                "string needs {} bytes, field holds {}",
                bytes.len(),
                width
            )));
        }
        self.put(&bytes)?;
        self.write_repeated(width - bytes.len(), fill)
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> BinaryResult<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Reads binary primitives from a byte slice.
///
/// # Examples
///
/// ```
/// use longan::common::binary::BinaryReader;
///
/// let data = [0x78, 0x56, 0x34, 0x12];
/// let mut reader = BinaryReader::new(&data);
/// assert_eq!(reader.read_u32().unwrap(), 0x12345678);
/// assert!(reader.read_u8().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
    order: ByteOrder,
    encoding: StringEncoding,
}

impl<'a> BinaryReader<'a> {
    /// Create a little-endian, UTF-16 reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            order: ByteOrder::LittleEndian,
            encoding: StringEncoding::Utf16,
        }
    }

    /// Use `order` for every subsequent multi-byte value.
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// Use `encoding` for every subsequent string.
    pub fn with_encoding(mut self, encoding: StringEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Current offset into the data.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute offset; positions past the end fail.
    pub fn set_position(&mut self, pos: usize) -> BinaryResult<()> {
        if pos > self.data.len() {
            return Err(BinaryError::UnexpectedEndOfData {
                expected: pos,
                available: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Bytes left after the current position.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    fn take(&mut self, len: usize) -> BinaryResult<&'a [u8]> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(BinaryError::UnexpectedEndOfData {
                expected: end,
                available: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> BinaryResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a single signed byte.
    #[inline]
    pub fn read_i8(&mut self) -> BinaryResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    read_fixed!(
        /// Read a 16-bit unsigned integer.
        read_u16, u16, U16
    );
    read_fixed!(
        /// Read a 16-bit signed integer.
        read_i16, i16, I16
    );
    read_fixed!(
        /// Read a 32-bit unsigned integer.
        read_u32, u32, U32
    );
    read_fixed!(
        /// Read a 32-bit signed integer.
        read_i32, i32, I32
    );
    read_fixed!(read_u64, u64, U64);
    read_fixed!(read_i64, i64, I64);
    read_fixed!(
        /// Read an IEEE 754 single-precision float.
        read_f32, f32, F32
    );
    read_fixed!(
        /// Read an IEEE 754 double-precision float.
        read_f64, f64, F64
    );

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> BinaryResult<&'a [u8]> {
        self.take(len)
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> BinaryResult<()> {
        self.take(len).map(|_| ())
    }

    /// Decode the next `byte_len` bytes as a string.
    pub fn read_string(&mut self, byte_len: usize) -> BinaryResult<String> {
        let bytes = self.take(byte_len)?;
        self.encoding.decode(bytes, self.order)
    }

    /// Read a string written by [`BinaryWriter::write_prefixed_string`].
    pub fn read_prefixed_string(&mut self) -> BinaryResult<String> {
        let units = self.read_u16()? as usize;
        self.read_string(units * self.encoding.code_unit_size())
    }

    /// Read a `width`-byte field, dropping the trailing NUL padding.
    pub fn read_fixed_string(&mut self, width: usize) -> BinaryResult<String> {
        let bytes = self.take(width)?;
        let unit = self.encoding.code_unit_size();
        let mut end = bytes.len() - bytes.len() % unit;
        while end >= unit && bytes[end - unit..end].iter().all(|&b| b == 0) {
            end -= unit;
        }
        self.encoding.decode(&bytes[..end], self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_little_endian() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_u16(0x1234).unwrap();
        writer.write_i16(-2).unwrap();
        writer.write_u32(0x12345678).unwrap();
        writer.write_i32(-1).unwrap();
        assert_eq!(writer.position(), 12);
        let data = writer.into_inner();
        assert_eq!(&data[..4], &[0x34, 0x12, 0xFE, 0xFF]);

        let mut reader = BinaryReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_u32().unwrap(), 0x12345678);
        assert_eq!(reader.read_i32().unwrap(), -1);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_integers_big_endian() {
        let mut writer = BinaryWriter::new(Vec::new()).with_byte_order(ByteOrder::BigEndian);
        writer.write_u32(0x0102_0304).unwrap();
        writer.write_f64(1.0).unwrap();
        let data = writer.into_inner();
        assert_eq!(&data[..4], &[1, 2, 3, 4]);
        assert_eq!(&data[4..12], &[0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);

        let mut reader = BinaryReader::new(&data).with_byte_order(ByteOrder::BigEndian);
        assert_eq!(reader.read_u32().unwrap(), 0x0102_0304);
        assert!((reader.read_f64().unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_floats() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_f32(1.5).unwrap();
        writer.write_f64(-0.25).unwrap();
        let data = writer.into_inner();
        let mut reader = BinaryReader::new(&data);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_f64().unwrap(), -0.25);
    }

    #[test]
    fn test_read_past_end() {
        let data = [0x01, 0x02, 0x03];
        let mut reader = BinaryReader::new(&data);
        assert!(reader.read_u16().is_ok());
        match reader.read_u16() {
            Err(BinaryError::UnexpectedEndOfData {
                expected,
                available,
            }) => {
                assert_eq!(expected, 4);
                assert_eq!(available, 3);
            },
            other => panic!("unexpected result: {:?}", other),
        }
        // A failed read does not consume input
        assert_eq!(reader.read_u8().unwrap(), 0x03);
    }

    #[test]
    fn test_write_repeated_spans_chunks() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_repeated(1300, 0xAB).unwrap();
        let data = writer.into_inner();
        assert_eq!(data.len(), 1300);
        assert!(data.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_fixed_string() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_fixed_string("Root Entry", 64, 0).unwrap();
        let data = writer.into_inner();
        assert_eq!(data.len(), 64);
        assert_eq!(&data[..4], &[b'R', 0, b'o', 0]);

        let mut reader = BinaryReader::new(&data);
        assert_eq!(reader.read_fixed_string(64).unwrap(), "Root Entry");

        let mut writer = BinaryWriter::new(Vec::new());
        assert!(matches!(
            writer.write_fixed_string("too long", 4, 0),
            Err(BinaryError::Overflow(_))
        ));
    }

    #[test]
    fn test_prefixed_string_codepage() {
        let cp1252 = StringEncoding::Codepage(encoding_rs::WINDOWS_1252);
        let mut writer = BinaryWriter::new(Vec::new()).with_encoding(cp1252);
        writer.write_prefixed_string("Sheet1").unwrap();
        let data = writer.into_inner();
        assert_eq!(&data[..2], &[6, 0]);
        assert_eq!(&data[2..], b"Sheet1");

        let mut reader = BinaryReader::new(&data).with_encoding(cp1252);
        assert_eq!(reader.read_prefixed_string().unwrap(), "Sheet1");
    }

    #[test]
    fn test_prefixed_string_utf16_counts_units() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_prefixed_string("Ünï").unwrap();
        let data = writer.into_inner();
        assert_eq!(&data[..2], &[3, 0]);
        assert_eq!(data.len(), 2 + 6);
    }
}
