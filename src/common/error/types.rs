//! Unified error types for Longan.
//!
//! Every fallible operation of the compound-file writer, the directory
//! model and the binary codec reports one of these variants.
use thiserror::Error;

/// Main error type for Longan operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while writing the compound file to its sink
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A sibling with the same name already exists under the storage
    #[error("Duplicate name: an entry named '{0}' already exists in this storage")]
    DuplicateName(String),

    /// Name is empty, longer than 31 UTF-16 code units, contains a
    /// forbidden character, or targets the root entry
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Two directory entries were given the same directory id
    #[error("Duplicate key: {0} is already present in the tree")]
    DuplicateKey(String),

    /// Lookup by name or by directory id found no entry
    #[error("Lookup failed: {0}")]
    LookupNotFound(String),

    /// The binary codec ran out of input
    #[error("Unexpected end of data: needed {expected} bytes, {available} available")]
    UnexpectedEndOfData { expected: usize, available: usize },

    /// Only little-endian compound files can be written
    #[error("Unsupported byte order: compound files can only be saved little-endian")]
    UnsupportedByteOrder,

    /// A structural limit of the format was exceeded
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// An allocation chain is cyclic, shared or unterminated
    #[error("Invalid sector chain: {0}")]
    InvalidChain(String),

    /// A string could not be represented in the target encoding
    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type for Longan operations.
pub type Result<T> = std::result::Result<T, Error>;
