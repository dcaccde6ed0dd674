//! Directory entries for OLE2 files
//!
//! The directory is the catalogue of every storage and stream in a compound
//! file. Entries live in an arena indexed by their directory id; each
//! storage owns a red-black tree of its children's ids, which is exactly the
//! structure the on-disk directory records describe.
//!
//! # Implementation Notes
//!
//! - Directory ids are handed out sequentially at creation, starting with
//!   the root entry at 0, and are never reused
//! - Children are keyed by directory id rather than by name, so sibling
//!   order in the tree is creation order
//! - Removed entries stay in the arena as empty records; their ids remain
//!   reserved so existing handles never point at a different entry
//! - Name uniqueness is checked with a linear scan over the siblings
//!
//! ## Record layout (128 bytes)
//!
//! ```text
//! 0   name, UTF-16LE, NUL-terminated, zero padded to 64 bytes
//! 64  name length in bytes including the terminator (u16)
//! 66  entry type (u8)        67  node color (u8)
//! 68  left sibling id        72  right sibling id
//! 76  child tree root id     80  CLSID (16 bytes)
//! 96  state bits             100 creation / modification times
//! 116 first sector           120 size (u32) + 4 reserved bytes
//! ```

use super::super::consts::*;
use super::rbtree::{Color, RbTree};
use crate::common::binary::BinaryWriter;
use crate::common::{Error, Result};
use bytes::Bytes;
use std::fmt;
use std::io::Write;

/// Sequential identity of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirectoryId(u32);

impl DirectoryId {
    /// Id of the root entry.
    pub const ROOT: DirectoryId = DirectoryId(0);

    /// Raw id as written into directory records.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a directory entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The root storage; also owns the short-stream region
    Root,
    /// A storage (folder) that can hold children
    Storage,
    /// A stream (leaf) holding bytes
    Stream,
    /// A removed entry, written as an unused record
    Empty,
}

impl EntryKind {
    /// Entry type byte of the directory record.
    pub fn type_byte(self) -> u8 {
        match self {
            EntryKind::Root => STGTY_ROOT,
            EntryKind::Storage => STGTY_STORAGE,
            EntryKind::Stream => STGTY_STREAM,
            EntryKind::Empty => STGTY_EMPTY,
        }
    }

    /// Whether entries of this kind can have children.
    #[inline]
    pub fn is_storage(self) -> bool {
        matches!(self, EntryKind::Root | EntryKind::Storage)
    }
}

/// A storage or stream in the directory.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    id: DirectoryId,
    name: String,
    kind: EntryKind,
    parent: Option<DirectoryId>,
    children: RbTree<DirectoryId, ()>,
    content: Bytes,
    sector: u32,
    size: u32,
}

impl DirectoryEntry {
    fn new(id: DirectoryId, name: String, kind: EntryKind, parent: Option<DirectoryId>) -> Self {
        Self {
            id,
            name,
            kind,
            parent,
            children: RbTree::new(),
            content: Bytes::new(),
            sector: ENDOFCHAIN,
            size: 0,
        }
    }

    pub fn id(&self) -> DirectoryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Storage holding this entry; `None` for the root.
    pub fn parent(&self) -> Option<DirectoryId> {
        self.parent
    }

    /// Stream bytes; empty for storages.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// First sector of the entry's chain, ENDOFCHAIN until a save places it.
    pub fn sector(&self) -> u32 {
        self.sector
    }

    /// Byte size recorded for the entry.
    ///
    /// Streams report their content length. The root reports the size of
    /// the short-stream region once a save has placed it.
    pub fn size(&self) -> u32 {
        match self.kind {
            EntryKind::Stream => self.content.len() as u32,
            _ => self.size,
        }
    }

    /// Child ids in tree order.
    pub fn children(&self) -> impl Iterator<Item = DirectoryId> + '_ {
        self.children.keys()
    }
}

/// Arena of every directory entry of a compound file.
#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
    root_clsid: [u8; 16],
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    /// Create a directory holding only the root entry.
    pub fn new() -> Self {
        Self {
            entries: vec![DirectoryEntry::new(
                DirectoryId::ROOT,
                ROOT_ENTRY_NAME.to_string(),
                EntryKind::Root,
                None,
            )],
            root_clsid: [0; 16],
        }
    }

    /// Id of the root storage.
    #[inline]
    pub fn root(&self) -> DirectoryId {
        DirectoryId::ROOT
    }

    /// Number of records, removed entries included.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the root entry cannot be removed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the serialized directory stream in bytes.
    pub fn stream_size(&self) -> usize {
        self.entries.len() * DIRENTRY_SIZE
    }

    pub fn root_clsid(&self) -> [u8; 16] {
        self.root_clsid
    }

    pub fn set_root_clsid(&mut self, clsid: [u8; 16]) {
        self.root_clsid = clsid;
    }

    /// Look up a live entry.
    ///
    /// # Errors
    ///
    /// `LookupNotFound` if `id` was never assigned or has been removed.
    pub fn entry(&self, id: DirectoryId) -> Result<&DirectoryEntry> {
        match self.entries.get(id.index()) {
            Some(entry) if entry.kind != EntryKind::Empty => Ok(entry),
            _ => Err(Error::LookupNotFound(format!("no directory entry with id {}", id))),
        }
    }

    fn entry_mut(&mut self, id: DirectoryId) -> Result<&mut DirectoryEntry> {
        match self.entries.get_mut(id.index()) {
            Some(entry) if entry.kind != EntryKind::Empty => Ok(entry),
            _ => Err(Error::LookupNotFound(format!("no directory entry with id {}", id))),
        }
    }

    fn storage(&self, id: DirectoryId) -> Result<&DirectoryEntry> {
        let entry = self.entry(id)?;
        if !entry.kind.is_storage() {
            return Err(Error::LookupNotFound(format!(
                "entry '{}' is a stream, not a storage",
                entry.name
            )));
        }
        Ok(entry)
    }

    /// Find a child of `parent` by name.
    pub fn find_child(&self, parent: DirectoryId, name: &str) -> Option<DirectoryId> {
        let storage = self.storage(parent).ok()?;
        storage
            .children
            .keys()
            .find(|&child| self.entries[child.index()].name == name)
    }

    /// Child of `parent` named `name`.
    ///
    /// # Errors
    ///
    /// `LookupNotFound` if `parent` is not a live storage or has no such
    /// child.
    pub fn child(&self, parent: DirectoryId, name: &str) -> Result<DirectoryId> {
        self.storage(parent)?;
        self.find_child(parent, name).ok_or_else(|| {
            Error::LookupNotFound(format!("no entry named '{}' in storage {}", name, parent))
        })
    }

    /// Children of `parent` in tree order.
    pub fn children(&self, parent: DirectoryId) -> Result<Vec<DirectoryId>> {
        Ok(self.storage(parent)?.children.keys().collect())
    }

    /// Live stream entries in id order.
    pub fn streams(&self) -> impl Iterator<Item = &DirectoryEntry> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::Stream)
    }

    /// Add a storage named `name` under `parent`.
    pub fn add_storage(&mut self, parent: DirectoryId, name: &str) -> Result<DirectoryId> {
        self.add_entry(parent, name, EntryKind::Storage, Bytes::new())
    }

    /// Add a stream named `name` holding `content` under `parent`.
    pub fn add_stream(
        &mut self,
        parent: DirectoryId,
        name: &str,
        content: impl Into<Bytes>,
    ) -> Result<DirectoryId> {
        self.add_entry(parent, name, EntryKind::Stream, content.into())
    }

    fn add_entry(
        &mut self,
        parent: DirectoryId,
        name: &str,
        kind: EntryKind,
        content: Bytes,
    ) -> Result<DirectoryId> {
        validate_name(name)?;
        self.storage(parent)?;
        if self.find_child(parent, name).is_some() {
            return Err(Error::DuplicateName(name.to_string()));
        }
        if self.entries.len() as u64 > MAXREGSID as u64 {
            return Err(Error::CapacityExceeded(format!(
                "directory id {} is above the largest regular id",
                self.entries.len()
            )));
        }

        let id = DirectoryId(self.entries.len() as u32);
        self.entry_mut(parent)?.children.insert(id, ())?;

        let mut entry = DirectoryEntry::new(id, name.to_string(), kind, Some(parent));
        entry.content = content;
        self.entries.push(entry);
        Ok(id)
    }

    /// Remove the child `name` of `parent`, and everything below it.
    ///
    /// # Errors
    ///
    /// `LookupNotFound` if there is no such child.
    pub fn remove(&mut self, parent: DirectoryId, name: &str) -> Result<()> {
        let id = self.child(parent, name)?;
        self.entry_mut(parent)?.children.remove(&id);

        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let entry = &mut self.entries[current.index()];
            pending.extend(entry.children.keys());
            *entry = DirectoryEntry::new(current, String::new(), EntryKind::Empty, None);
        }
        Ok(())
    }

    /// Rename the entry `id`.
    ///
    /// # Errors
    ///
    /// `InvalidName` for the root entry or an invalid name,
    /// `DuplicateName` if a sibling already has that name.
    pub fn rename(&mut self, id: DirectoryId, name: &str) -> Result<()> {
        let parent = match self.entry(id)?.parent {
            Some(parent) => parent,
            None => {
                return Err(Error::InvalidName {
                    name: name.to_string(),
                    reason: "the root entry cannot be renamed",
                });
            },
        };
        validate_name(name)?;
        match self.find_child(parent, name) {
            Some(existing) if existing != id => Err(Error::DuplicateName(name.to_string())),
            _ => {
                self.entry_mut(id)?.name = name.to_string();
                Ok(())
            },
        }
    }

    /// Replace the bytes of stream `id`.
    pub fn set_stream_content(&mut self, id: DirectoryId, content: impl Into<Bytes>) -> Result<()> {
        let entry = self.entry_mut(id)?;
        if entry.kind != EntryKind::Stream {
            return Err(Error::LookupNotFound(format!(
                "entry '{}' is a storage, not a stream",
                entry.name
            )));
        }
        entry.content = content.into();
        Ok(())
    }

    /// Record where the data of entry `id` was placed.
    pub(crate) fn set_location(&mut self, id: DirectoryId, sector: u32, size: u32) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry.sector = sector;
        entry.size = size;
        Ok(())
    }

    /// Serialize every record, in id order.
    pub fn write_to<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<()> {
        for entry in &self.entries {
            self.write_record(entry, writer)?;
        }
        Ok(())
    }

    /// Serialize the directory stream into a buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut writer = BinaryWriter::new(Vec::with_capacity(self.stream_size()));
        self.write_to(&mut writer)?;
        Ok(Bytes::from(writer.into_inner()))
    }

    fn write_record<W: Write>(&self, entry: &DirectoryEntry, w: &mut BinaryWriter<W>) -> Result<()> {
        if entry.kind == EntryKind::Empty {
            w.write_repeated(NAME_FIELD_SIZE + 4, 0)?;
            for _ in 0..3 {
                w.write_u32(NOSTREAM)?;
            }
            w.write_repeated(DIRENTRY_SIZE - 80, 0)?;
            return Ok(());
        }

        let name_units = entry.name.encode_utf16().count();
        w.write_fixed_string(&entry.name, NAME_FIELD_SIZE, 0)?;
        w.write_u16(((name_units + 1) * 2) as u16)?;
        w.write_u8(entry.kind.type_byte())?;

        let (color, left, right) = match entry.parent {
            Some(parent) => match self.entries[parent.index()].children.links(&entry.id) {
                Some(links) => (links.color, links.left, links.right),
                None => (Color::Black, None, None),
            },
            None => (Color::Black, None, None),
        };
        w.write_u8(color as u8)?;
        w.write_u32(left.map_or(NOSTREAM, DirectoryId::get))?;
        w.write_u32(right.map_or(NOSTREAM, DirectoryId::get))?;
        w.write_u32(entry.children.root_key().map_or(NOSTREAM, DirectoryId::get))?;

        if entry.kind == EntryKind::Root {
            w.write_bytes(&self.root_clsid)?;
        } else {
            w.write_repeated(16, 0)?;
        }
        // State bits, creation and modification times
        w.write_repeated(4 + 16, 0)?;

        // Storages carry no data
        let (sector, size) = match entry.kind {
            EntryKind::Storage => (0, 0),
            _ => (entry.sector, entry.size()),
        };
        w.write_u32(sector)?;
        w.write_u32(size)?;
        w.write_u32(0)?;
        Ok(())
    }
}

/// Check an entry name against the directory record limits.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.encode_utf16().count() > MAX_NAME_LEN {
        Some("name is longer than 31 UTF-16 code units")
    } else if name.contains(['/', '\\', ':', '!']) {
        Some("name contains one of / \\ : !")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
