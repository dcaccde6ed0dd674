//! Options controlling how a compound file is written.

use super::super::consts::MINI_STREAM_CUTOFF;
use crate::common::binary::ByteOrder;

/// Configuration for [`CompoundFile`](super::CompoundFile).
///
/// Sector sizes are fixed by the version 3 layout and are not configurable.
///
/// # Examples
///
/// ```
/// use longan::WriterOptions;
///
/// let options = WriterOptions::new()
///     .with_mini_stream_cutoff(4096)
///     .with_sector_fill(0x00);
/// assert_eq!(options.mini_stream_cutoff, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Byte order of the written file; only little-endian can be saved
    pub byte_order: ByteOrder,
    /// Streams shorter than this many bytes go to the short-stream region
    pub mini_stream_cutoff: u32,
    /// CLSID written into the root entry
    pub root_clsid: [u8; 16],
    /// Byte used to pad the tail of stream sectors; the directory is always
    /// padded with zeros
    pub sector_fill: u8,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::LittleEndian,
            mini_stream_cutoff: MINI_STREAM_CUTOFF,
            root_clsid: [0; 16],
            sector_fill: 0x00,
        }
    }
}

impl WriterOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the byte order.
    #[inline]
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Set the short-stream threshold.
    #[inline]
    pub fn with_mini_stream_cutoff(mut self, cutoff: u32) -> Self {
        self.mini_stream_cutoff = cutoff;
        self
    }

    /// Set the root entry CLSID.
    #[inline]
    pub fn with_root_clsid(mut self, clsid: [u8; 16]) -> Self {
        self.root_clsid = clsid;
        self
    }

    /// Set the sector padding byte.
    #[inline]
    pub fn with_sector_fill(mut self, fill: u8) -> Self {
        self.sector_fill = fill;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = WriterOptions::default();
        assert_eq!(options.byte_order, ByteOrder::LittleEndian);
        assert_eq!(options.mini_stream_cutoff, 4096);
        assert_eq!(options.root_clsid, [0; 16]);
        assert_eq!(options, WriterOptions::new());
    }

    #[test]
    fn test_builder_chain() {
        let options = WriterOptions::new()
            .with_byte_order(ByteOrder::BigEndian)
            .with_root_clsid([1; 16])
            .with_sector_fill(0xCC);
        assert_eq!(options.byte_order, ByteOrder::BigEndian);
        assert_eq!(options.root_clsid, [1; 16]);
        assert_eq!(options.sector_fill, 0xCC);
        assert_eq!(options.mini_stream_cutoff, 4096);
    }
}
