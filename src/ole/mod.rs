/// Constants for OLE file format
pub mod consts;

/// OLE2 compound file writer
///
/// Builds storages and streams in memory and serializes them as a
/// compound file with its SAT, SSAT, MSAT and directory.
pub mod writer;

// Re-export public types for convenient access
pub use writer::{CompoundFile, DirectoryEntry, DirectoryId, EntryKind, Layout, WriterOptions};
