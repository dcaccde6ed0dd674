//! Longan - A Rust library for writing OLE2 compound files
//!
//! This library writes the OLE2 / Compound File Binary Format (CFBF)
//! container used by legacy Microsoft Office documents such as `.xls`.
//! A document is built as a tree of storages and streams under a root
//! storage and serialized in one pass.
//!
//! # Features
//!
//! - **Compound file writer**: SAT, SSAT, MSAT (including overflow sectors)
//!   and directory stream for the version 3 layout
//! - **Red-black directory tree**: each storage indexes its children the
//!   way the on-disk directory records expect
//! - **Binary codec**: little- and big-endian primitives and encoded
//!   strings over any `Write` sink or byte slice
//!
//! # Example
//!
//! ```no_run
//! use longan::CompoundFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut file = CompoundFile::new();
//! let root = file.root();
//! file.add_stream(root, "Workbook", vec![0u8; 20])?;
//!
//! let sub = file.add_storage(root, "Sub")?;
//! file.add_stream(sub, "Data", vec![0u8; 5000])?;
//!
//! let layout = file.save("book.xls")?;
//! println!("wrote {} sectors", layout.total_sectors);
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Writing into memory
//!
//! ```
//! use longan::CompoundFile;
//!
//! # fn main() -> Result<(), longan::Error> {
//! let mut file = CompoundFile::new();
//! file.create_stream(&["Storage", "Stream"], b"Hello, World!".to_vec())?;
//!
//! let mut buffer = Vec::new();
//! file.write_to(&mut buffer)?;
//! assert_eq!(&buffer[..8], b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1");
//! # Ok(())
//! # }
//! ```

/// Common types, codecs and errors
pub mod common;

/// OLE2 (Object Linking and Embedding) compound files
///
/// Constants of the on-disk format and the compound file writer.
pub mod ole;

// Re-export commonly used types for convenience
pub use common::{ByteOrder, Error, Result};
pub use ole::writer::{CompoundFile, DirectoryId, EntryKind, Layout, WriterOptions};
