//! OLE2 file writing module
//!
//! This module builds OLE2 compound documents (CFBF version 3, 512-byte
//! sectors) from an in-memory tree of storages and streams.
//!
//! # Implementation Notes
//!
//! The writer follows the Microsoft Compound File Binary Format
//! specification. Allocation tables are built by [`SectorAllocator`], the
//! sectors holding the SAT are tracked by [`MasterAllocator`], and each
//! storage indexes its children with a red-black tree.

/// SAT / SSAT sector allocation
pub mod fat;

/// MSAT (master sector allocation table) tracking and overflow sectors
pub mod difat;

/// Red-black tree over directory ids
pub mod rbtree;

/// Directory entries and record serialization
pub mod directory;

/// OLE2 header generation
pub mod header;

/// Writer configuration
pub mod options;

/// Core compound file writer
mod core;


// Re-export public types
pub use core::{CompoundFile, Layout};
pub use difat::MasterAllocator;
pub use directory::{Directory, DirectoryEntry, DirectoryId, EntryKind};
pub use fat::{Allocation, SectorAllocator};
pub use header::HeaderBuilder;
pub use options::WriterOptions;
pub use rbtree::{Color, RbTree};
