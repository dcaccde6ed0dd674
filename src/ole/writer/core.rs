//! Compound file writer
//!
//! [`CompoundFile`] holds a tree of storages and streams in memory and
//! serializes it as an OLE2 (CFBF version 3) image in one pass.
//!
//! # Architecture
//!
//! Nothing is written until [`CompoundFile::write_to`] or
//! [`CompoundFile::save`] is called. Saving then has to size every region
//! before any of them can be placed, because the SAT describes its own
//! sectors and the MSAT describes the SAT:
//!
//! 1. Streams shorter than the cutoff are allocated in the SSAT; the short
//!    sectors they use form the short-stream region
//! 2. The SSAT, the short-stream region, the long streams and the
//!    directory are counted in 512-byte sectors
//! 3. The SAT and MSAT sector counts are iterated until they cover the
//!    whole file, their own sectors included
//! 4. Everything is allocated in the SAT in that order: SSAT, short-stream
//!    region, long streams, directory, SAT sectors (FATSECT), MSAT sectors
//!    (DIFSECT)
//! 5. The header is written, the tables and the directory are encoded and
//!    bound to their chains, and every sector is emitted in index order
//!
//! # Example
//!
//! ```rust,no_run
//! use longan::CompoundFile;
//!
//! let mut file = CompoundFile::new();
//! let root = file.root();
//! file.add_stream(root, "Workbook", vec![0u8; 20])?;
//! let sub = file.add_storage(root, "Sub")?;
//! file.add_stream(sub, "Data", vec![0u8; 5000])?;
//!
//! // Or by path, creating storages on the way
//! file.create_stream(&["Other", "Nested"], b"Nested content".to_vec())?;
//!
//! file.save("output.xls")?;
//! # Ok::<(), longan::Error>(())
//! ```

use super::super::consts::*;
use super::difat::{MasterAllocator, encode_overflow, table_sector_counts};
use super::directory::{Directory, DirectoryEntry, DirectoryId, EntryKind};
use super::fat::SectorAllocator;
use super::header::HeaderBuilder;
use super::options::WriterOptions;
use crate::common::binary::{BinaryWriter, ByteOrder};
use crate::common::{Error, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Where a save placed each region of the file.
///
/// Sector numbers count from the first sector after the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Sectors following the header
    pub total_sectors: usize,
    /// Sectors holding the SAT, in table order
    pub sat_sectors: Vec<u32>,
    /// Sectors holding MSAT overflow entries, in chain order
    pub msat_sectors: Vec<u32>,
    /// First sector of the directory stream
    pub directory_start: u32,
    /// Sectors used by the directory stream
    pub directory_sectors: usize,
    /// First SSAT sector, ENDOFCHAIN when there are no short streams
    pub ssat_start: u32,
    /// Sectors used by the SSAT
    pub ssat_sectors: usize,
    /// First sector of the short-stream region, ENDOFCHAIN when empty
    pub short_region_start: u32,
    /// Size of the short-stream region in bytes
    pub short_region_size: u32,
    /// Streams stored in the short-stream region
    pub short_streams: Vec<DirectoryId>,
    /// Streams stored directly in the SAT
    pub long_streams: Vec<DirectoryId>,
}

/// In-memory compound file.
///
/// All operations are buffered until `save()` or `write_to()` is called.
#[derive(Debug, Clone)]
pub struct CompoundFile {
    directory: Directory,
    options: WriterOptions,
}

impl Default for CompoundFile {
    fn default() -> Self {
        Self::new()
    }
}

impl CompoundFile {
    /// Create an empty compound file with default options.
    pub fn new() -> Self {
        Self::with_options(WriterOptions::default())
    }

    /// Create an empty compound file with `options`.
    pub fn with_options(options: WriterOptions) -> Self {
        let mut directory = Directory::new();
        directory.set_root_clsid(options.root_clsid);
        Self { directory, options }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// The directory of every entry.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Id of the root storage.
    pub fn root(&self) -> DirectoryId {
        self.directory.root()
    }

    /// Set the CLSID of the root entry
    ///
    /// Office applications use it to recognize the document type.
    pub fn set_root_clsid(&mut self, clsid: [u8; 16]) {
        self.options.root_clsid = clsid;
        self.directory.set_root_clsid(clsid);
    }

    /// Add a storage under `parent`.
    pub fn add_storage(&mut self, parent: DirectoryId, name: &str) -> Result<DirectoryId> {
        self.directory.add_storage(parent, name)
    }

    /// Add a stream holding `content` under `parent`.
    pub fn add_stream(
        &mut self,
        parent: DirectoryId,
        name: &str,
        content: impl Into<Bytes>,
    ) -> Result<DirectoryId> {
        self.directory.add_stream(parent, name, content)
    }

    /// Remove the child `name` of `parent`, with everything below it.
    pub fn remove(&mut self, parent: DirectoryId, name: &str) -> Result<()> {
        self.directory.remove(parent, name)
    }

    /// Rename an entry; the root cannot be renamed.
    pub fn rename(&mut self, id: DirectoryId, name: &str) -> Result<()> {
        self.directory.rename(id, name)
    }

    /// Child of `parent` named `name`.
    pub fn child(&self, parent: DirectoryId, name: &str) -> Result<DirectoryId> {
        self.directory.child(parent, name)
    }

    pub fn entry(&self, id: DirectoryId) -> Result<&DirectoryEntry> {
        self.directory.entry(id)
    }

    /// Children of `parent` in tree order.
    pub fn children(&self, parent: DirectoryId) -> Result<Vec<DirectoryId>> {
        self.directory.children(parent)
    }

    /// Replace the content of stream `id`.
    pub fn set_stream_content(&mut self, id: DirectoryId, content: impl Into<Bytes>) -> Result<()> {
        self.directory.set_stream_content(id, content)
    }

    /// Resolve a path of names from the root.
    ///
    /// An empty path resolves to the root.
    pub fn lookup(&self, path: &[&str]) -> Result<DirectoryId> {
        path.iter()
            .try_fold(self.root(), |parent, name| self.directory.child(parent, name))
    }

    /// Create a storage at `path`
    ///
    /// Missing parent storages are created; existing ones are reused.
    ///
    /// # Errors
    ///
    /// `InvalidName` for an empty path or component, `DuplicateName` if a
    /// stream already uses one of the names.
    pub fn create_storage(&mut self, path: &[&str]) -> Result<DirectoryId> {
        if path.is_empty() {
            return Err(Error::InvalidName {
                name: String::new(),
                reason: "path is empty",
            });
        }

        let mut current = self.root();
        for name in path {
            current = match self.directory.find_child(current, name) {
                Some(id) if self.directory.entry(id)?.kind() == EntryKind::Storage => id,
                Some(_) => return Err(Error::DuplicateName(name.to_string())),
                None => self.directory.add_storage(current, name)?,
            };
        }
        Ok(current)
    }

    /// Create a stream at `path`, or replace its content if it exists
    ///
    /// Missing parent storages are created.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use longan::CompoundFile;
    /// let mut file = CompoundFile::new();
    /// let id = file.create_stream(&["MyStorage", "MyStream"], b"Hello".to_vec())?;
    /// assert_eq!(file.lookup(&["MyStorage", "MyStream"])?, id);
    /// # Ok::<(), longan::Error>(())
    /// ```
    pub fn create_stream(&mut self, path: &[&str], content: impl Into<Bytes>) -> Result<DirectoryId> {
        let Some((name, parents)) = path.split_last() else {
            return Err(Error::InvalidName {
                name: String::new(),
                reason: "path is empty",
            });
        };

        let parent = if parents.is_empty() {
            self.root()
        } else {
            self.create_storage(parents)?
        };

        match self.directory.find_child(parent, name) {
            Some(id) if self.directory.entry(id)?.kind() == EntryKind::Stream => {
                self.directory.set_stream_content(id, content)?;
                Ok(id)
            },
            Some(_) => Err(Error::DuplicateName(name.to_string())),
            None => self.directory.add_stream(parent, name, content),
        }
    }

    /// Delete the stream or storage at `path`
    ///
    /// Storages are deleted with everything below them.
    pub fn delete(&mut self, path: &[&str]) -> Result<()> {
        let Some((name, parents)) = path.split_last() else {
            return Err(Error::InvalidName {
                name: ROOT_ENTRY_NAME.to_string(),
                reason: "the root entry cannot be removed",
            });
        };
        let parent = self.lookup(parents)?;
        self.directory.remove(parent, name)
    }

    /// Save the compound file to a path
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<Layout> {
        let file = File::create(path)?;
        let mut buffered = BufWriter::new(file);
        let layout = self.write_to(&mut buffered)?;
        buffered.flush()?;
        Ok(layout)
    }

    /// Serialize the compound file to `writer`
    ///
    /// # Errors
    ///
    /// `UnsupportedByteOrder` before anything is written if the options ask
    /// for big-endian output; `CapacityExceeded` if a stream or the whole
    /// file exceeds the version 3 limits. Any error after the header has
    /// been written leaves `writer` holding a truncated image.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> Result<Layout> {
        if self.options.byte_order != ByteOrder::LittleEndian {
            return Err(Error::UnsupportedByteOrder);
        }
        let cutoff = self.options.mini_stream_cutoff as usize;
        let fill = self.options.sector_fill;

        // Route streams and place the short ones
        let mut ssat = SectorAllocator::with_fill(MINI_SECTOR_SIZE, fill);
        let mut short_streams = Vec::new();
        let mut long_streams = Vec::new();
        let mut placements = Vec::new();

        for entry in self.directory.streams() {
            let content = entry.content().clone();
            region_size(content.len(), || format!("stream '{}'", entry.name()))?;
            if content.len() < cutoff {
                let allocation = ssat.allocate(content.len(), ENDOFCHAIN)?;
                let head = allocation.head;
                ssat.allocate_stream_content(head, content, fill)?;
                placements.push((entry.id(), head));
                short_streams.push(entry.id());
            } else {
                long_streams.push((entry.id(), content));
            }
        }

        let has_short = !ssat.is_empty();
        let short_region_size = ssat.len() * MINI_SECTOR_SIZE;
        let short_region_len = region_size(short_region_size, || "short-stream region".to_string())?;
        let ssat_table_size = ssat.len() * 4;
        debug!(
            short = short_streams.len(),
            long = long_streams.len(),
            short_region_size,
            "routed streams"
        );

        // Size every region in main sectors
        let sectors_for = |len: usize| len.div_ceil(SECTOR_SIZE_V3);
        let ssat_sectors = sectors_for(ssat_table_size);
        let short_region_sectors = sectors_for(short_region_size);
        let long_sectors: usize = long_streams
            .iter()
            .map(|(_, content)| sectors_for(content.len()).max(1))
            .sum();
        let directory_size = self.directory.stream_size();
        let directory_sectors = sectors_for(directory_size);
        let used = ssat_sectors + short_region_sectors + long_sectors + directory_sectors;
        let (n_sat, n_msat) = table_sector_counts(used, SECTOR_SIZE_V3);
        debug!(
            ssat_sectors,
            short_region_sectors,
            long_sectors,
            directory_sectors,
            sat_sectors = n_sat,
            msat_sectors = n_msat,
            "sized regions"
        );

        // Allocate in dependency order
        let mut master = MasterAllocator::new(SectorAllocator::with_fill(SECTOR_SIZE_V3, fill));

        let (ssat_start, short_region_start) = if has_short {
            let table = master.sat_mut().allocate(ssat_table_size, ENDOFCHAIN)?;
            let region = master.sat_mut().allocate(short_region_size, ENDOFCHAIN)?;
            (table.head, region.head)
        } else {
            (ENDOFCHAIN, ENDOFCHAIN)
        };

        for (id, content) in &long_streams {
            let allocation = master.sat_mut().allocate(content.len(), ENDOFCHAIN)?;
            master
                .sat_mut()
                .allocate_stream_content(allocation.head, content.clone(), fill)?;
            placements.push((*id, allocation.head));
        }

        let directory_start = master.sat_mut().allocate(directory_size, ENDOFCHAIN)?.head;

        for _ in 0..n_sat {
            master.allocate(SECTOR_SIZE_V3, FATSECT)?;
        }
        let mut msat_sectors = Vec::with_capacity(n_msat);
        for _ in 0..n_msat {
            msat_sectors.push(master.sat_mut().allocate(SECTOR_SIZE_V3, DIFSECT)?.head);
        }
        debug_assert_eq!(master.sat().len(), used + n_sat + n_msat);

        // Record locations before the directory is encoded
        for &(id, head) in &placements {
            let size = self.directory.entry(id)?.size();
            self.directory.set_location(id, head, size)?;
        }
        let root = self.directory.root();
        self.directory
            .set_location(root, short_region_start, short_region_len)?;

        master.sat().validate()?;
        ssat.validate()?;

        // Bind tables, short-stream region and directory to their chains
        if has_short {
            let table = ssat.encode_table(SECTOR_SIZE_V3)?;
            master
                .sat_mut()
                .allocate_stream_content(ssat_start, table, TABLE_FILL)?;
            let region = ssat.to_bytes()?;
            master
                .sat_mut()
                .allocate_stream_content(short_region_start, region, fill)?;
        }

        let directory = self.directory.to_bytes()?;
        master
            .sat_mut()
            .allocate_stream_content(directory_start, directory, DIRECTORY_FILL)?;

        let sat_table = master.sat().encode_table(SECTOR_SIZE_V3)?;
        let sat_sectors = master.allocations().to_vec();
        bind_per_sector(master.sat_mut(), &sat_sectors, &sat_table)?;

        let overflow = encode_overflow(master.overflow_entries(), &msat_sectors, SECTOR_SIZE_V3)?;
        bind_per_sector(master.sat_mut(), &msat_sectors, &overflow)?;

        // Header, then every sector in index order
        let mut header = HeaderBuilder::new();
        header.set_first_dir_sector(directory_start);
        header.set_mini_stream_cutoff(self.options.mini_stream_cutoff);
        header.set_ssat(ssat_start, ssat_sectors as u32);
        header.set_msat(
            msat_sectors.first().copied().unwrap_or(ENDOFCHAIN),
            n_msat as u32,
        );
        header.add_sat_sectors(&sat_sectors);

        let mut sink = BinaryWriter::new(writer);
        header.write_to(&mut sink)?;
        master.sat().write_all_sectors_to(&mut sink)?;
        sink.flush()?;

        let total_sectors = master.sat().len();
        debug!(total_sectors, bytes = sink.position(), "wrote compound file");

        Ok(Layout {
            total_sectors,
            sat_sectors,
            msat_sectors,
            directory_start,
            directory_sectors,
            ssat_start,
            ssat_sectors,
            short_region_start,
            short_region_size: short_region_len,
            short_streams,
            long_streams: long_streams.into_iter().map(|(id, _)| id).collect(),
        })
    }
}

/// Byte length of a stream or region as stored in a directory record.
fn region_size(len: usize, what: impl FnOnce() -> String) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        Error::CapacityExceeded(format!("{} is {} bytes, above the 4 GiB limit", what(), len))
    })
}

/// Bind consecutive sector-sized slices of `data` to single-sector chains.
fn bind_per_sector(sat: &mut SectorAllocator, sectors: &[u32], data: &Bytes) -> Result<()> {
    let size = sat.sector_size();
    for (i, &sector) in sectors.iter().enumerate() {
        let start = (i * size).min(data.len());
        let end = ((i + 1) * size).min(data.len());
        sat.allocate_stream_content(sector, data.slice(start..end), TABLE_FILL)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_writer() {
        let file = CompoundFile::new();
        assert_eq!(file.root().get(), 0);
        assert_eq!(file.directory().len(), 1);
        assert_eq!(file.options().mini_stream_cutoff, 4096);
    }

    #[test]
    fn test_create_stream_creates_parents() {
        let mut file = CompoundFile::new();
        let id = file.create_stream(&["A", "B", "C"], b"abc".to_vec()).unwrap();
        let b = file.lookup(&["A", "B"]).unwrap();
        assert_eq!(file.entry(b).unwrap().kind(), EntryKind::Storage);
        assert_eq!(file.lookup(&["A", "B", "C"]).unwrap(), id);
        assert_eq!(file.directory().len(), 4);
    }

    #[test]
    fn test_create_stream_replaces_content() {
        let mut file = CompoundFile::new();
        let first = file.create_stream(&["S"], b"one".to_vec()).unwrap();
        let second = file.create_stream(&["S"], b"three".to_vec()).unwrap();
        assert_eq!(first, second);
        assert_eq!(file.entry(first).unwrap().content().as_ref(), b"three");
    }

    #[test]
    fn test_path_conflicts() {
        let mut file = CompoundFile::new();
        file.create_stream(&["S"], b"x".to_vec()).unwrap();
        assert!(matches!(file.create_storage(&["S"]), Err(Error::DuplicateName(_))));
        assert!(matches!(
            file.create_stream(&["S", "T"], Vec::new()),
            Err(Error::DuplicateName(_))
        ));
        file.create_storage(&["D"]).unwrap();
        assert!(matches!(file.create_stream(&["D"], Vec::new()), Err(Error::DuplicateName(_))));
        assert!(matches!(file.create_storage(&[]), Err(Error::InvalidName { .. })));
    }

    #[test]
    fn test_delete_by_path() {
        let mut file = CompoundFile::new();
        file.create_stream(&["Dir", "Inner"], b"x".to_vec()).unwrap();
        file.delete(&["Dir"]).unwrap();
        assert!(matches!(file.lookup(&["Dir"]), Err(Error::LookupNotFound(_))));
        assert!(matches!(file.delete(&["Dir"]), Err(Error::LookupNotFound(_))));
        assert!(matches!(file.delete(&[]), Err(Error::InvalidName { .. })));
    }

    #[test]
    fn test_big_endian_fails_before_output() {
        let options = WriterOptions::new().with_byte_order(ByteOrder::BigEndian);
        let mut file = CompoundFile::with_options(options);
        file.create_stream(&["S"], b"x".to_vec()).unwrap();

        let mut out = Vec::new();
        assert!(matches!(file.write_to(&mut out), Err(Error::UnsupportedByteOrder)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_region_size_limit() {
        let name = || "region".to_string();
        assert_eq!(region_size(4096, name).unwrap(), 4096);
        assert_eq!(region_size(u32::MAX as usize, name).unwrap(), u32::MAX);
        match region_size(u32::MAX as usize + 1, || "short-stream region".to_string()) {
            Err(Error::CapacityExceeded(msg)) => assert!(msg.starts_with("short-stream region")),
            other => panic!("expected CapacityExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_bind_per_sector_pads_last() {
        let mut sat = SectorAllocator::new(512);
        let a = sat.allocate(512, FATSECT).unwrap();
        let b = sat.allocate(512, FATSECT).unwrap();
        let data = Bytes::from(vec![0x11; 600]);
        bind_per_sector(&mut sat, &[a.head, b.head], &data).unwrap();

        let out = sat.to_bytes().unwrap();
        assert!(out[..600].iter().all(|&v| v == 0x11));
        assert!(out[600..].iter().all(|&v| v == TABLE_FILL));
    }
}
