//! OLE2 header generation
//!
//! Generates the 512-byte OLE2 file header with the magic bytes, version
//! information, and the locations of the SAT, SSAT, MSAT and directory.
//!
//! # Implementation Notes
//!
//! - Only the version 3 layout (512-byte sectors, 64-byte short sectors)
//!   is produced
//! - The header embeds the first 109 SAT sector IDs; unused slots read
//!   FREESECT, and later IDs belong in MSAT sectors

use super::super::consts::*;
use crate::common::Result;
use crate::common::binary::BinaryWriter;
use std::io::Write;

/// OLE2 header builder
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    /// First sector of directory stream
    first_dir_sector: u32,
    /// Streams shorter than this live in the short-stream region
    mini_stream_cutoff: u32,
    /// First sector of the SSAT
    first_ssat_sector: u32,
    /// Number of SSAT sectors
    num_ssat_sectors: u32,
    /// First MSAT sector
    first_msat_sector: u32,
    /// Number of MSAT sectors
    num_msat_sectors: u32,
    /// Every SAT sector ID, in order
    sat_sectors: Vec<u32>,
}

impl Default for HeaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderBuilder {
    /// Create a header for an empty file.
    pub fn new() -> Self {
        Self {
            first_dir_sector: ENDOFCHAIN,
            mini_stream_cutoff: MINI_STREAM_CUTOFF,
            first_ssat_sector: ENDOFCHAIN,
            num_ssat_sectors: 0,
            first_msat_sector: ENDOFCHAIN,
            num_msat_sectors: 0,
            sat_sectors: Vec::new(),
        }
    }

    /// Set the first directory sector
    pub fn set_first_dir_sector(&mut self, sector: u32) {
        self.first_dir_sector = sector;
    }

    /// Set the short-stream size threshold
    pub fn set_mini_stream_cutoff(&mut self, cutoff: u32) {
        self.mini_stream_cutoff = cutoff;
    }

    /// Set SSAT information
    pub fn set_ssat(&mut self, first_sector: u32, num_sectors: u32) {
        self.first_ssat_sector = first_sector;
        self.num_ssat_sectors = num_sectors;
    }

    /// Set MSAT information
    pub fn set_msat(&mut self, first_sector: u32, num_sectors: u32) {
        self.first_msat_sector = first_sector;
        self.num_msat_sectors = num_sectors;
    }

    /// Add SAT sectors to the header
    ///
    /// All of them are counted; the first 109 are embedded.
    pub fn add_sat_sectors(&mut self, sectors: &[u32]) {
        self.sat_sectors.extend_from_slice(sectors);
    }

    /// Write the 512-byte header block.
    pub fn write_to<W: Write>(&self, w: &mut BinaryWriter<W>) -> Result<()> {
        let start = w.position();
        w.write_bytes(MAGIC)?;
        // CLSID
        w.write_repeated(16, 0)?;
        w.write_u16(MINOR_VERSION)?;
        w.write_u16(MAJOR_VERSION_V3)?;
        w.write_u16(BYTE_ORDER_MARK)?;
        w.write_u16(SECTOR_SHIFT_V3)?;
        w.write_u16(MINI_SECTOR_SHIFT)?;
        // Reserved, then the directory sector count (always 0 for v3)
        w.write_repeated(6, 0)?;
        w.write_u32(0)?;

        w.write_u32(self.sat_sectors.len() as u32)?;
        w.write_u32(self.first_dir_sector)?;
        // Transaction signature
        w.write_u32(0)?;
        w.write_u32(self.mini_stream_cutoff)?;
        w.write_u32(self.first_ssat_sector)?;
        w.write_u32(self.num_ssat_sectors)?;
        w.write_u32(self.first_msat_sector)?;
        w.write_u32(self.num_msat_sectors)?;
        debug_assert_eq!(w.position() - start, HEADER_MSAT_OFFSET as u64);

        let embedded = self.sat_sectors.len().min(HEADER_MSAT_ENTRIES);
        for &sector in &self.sat_sectors[..embedded] {
            w.write_u32(sector)?;
        }
        w.write_repeated((HEADER_MSAT_ENTRIES - embedded) * 4, TABLE_FILL)?;
        debug_assert_eq!(w.position() - start, HEADER_SIZE as u64);
        Ok(())
    }

    /// Generate the OLE2 header block
    pub fn generate(&self) -> Result<Vec<u8>> {
        let mut w = BinaryWriter::new(Vec::with_capacity(HEADER_SIZE));
        self.write_to(&mut w)?;
        Ok(w.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::binary::BinaryReader;

    #[test]
    fn test_header_generation() {
        let mut builder = HeaderBuilder::new();
        builder.set_first_dir_sector(1);
        builder.add_sat_sectors(&[0]);

        let header = builder.generate().unwrap();
        assert_eq!(header.len(), HEADER_SIZE);
        assert_eq!(&header[0..8], MAGIC);

        let mut r = BinaryReader::new(&header);
        r.set_position(24).unwrap();
        assert_eq!(r.read_u16().unwrap(), 0x003E);
        assert_eq!(r.read_u16().unwrap(), 3);
        assert_eq!(r.read_u16().unwrap(), 0xFFFE);
        assert_eq!(r.read_u16().unwrap(), 9);
        assert_eq!(r.read_u16().unwrap(), 6);

        r.set_position(44).unwrap();
        assert_eq!(r.read_u32().unwrap(), 1);
        assert_eq!(r.read_u32().unwrap(), 1);
        r.set_position(56).unwrap();
        assert_eq!(r.read_u32().unwrap(), 4096);
        assert_eq!(r.read_u32().unwrap(), ENDOFCHAIN);
        assert_eq!(r.read_u32().unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), ENDOFCHAIN);
        assert_eq!(r.read_u32().unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), FREESECT);
    }

    #[test]
    fn test_only_109_sectors_embedded() {
        let mut builder = HeaderBuilder::new();
        let sectors: Vec<u32> = (1000..1150).collect();
        builder.add_sat_sectors(&sectors);
        builder.set_msat(7, 1);

        let header = builder.generate().unwrap();
        assert_eq!(header.len(), HEADER_SIZE);
        assert_eq!(&header[44..48], &150u32.to_le_bytes());
        assert_eq!(&header[68..72], &7u32.to_le_bytes());
        assert_eq!(
            &header[HEADER_MSAT_OFFSET..HEADER_MSAT_OFFSET + 4],
            &1000u32.to_le_bytes()
        );
        assert_eq!(&header[508..512], &1108u32.to_le_bytes());
    }
}
