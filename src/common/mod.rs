//! Common types and utilities shared across the crate.
//!
//! This module provides the binary codec, string encodings and the unified
//! error type used by the compound-file writer.

// Submodule declarations
pub mod binary;
pub mod encoding;
pub mod error;

// Re-exports for convenience
pub use binary::{BinaryError, BinaryReader, BinaryResult, BinaryWriter, ByteOrder};
pub use encoding::StringEncoding;
pub use error::{Error, Result};
