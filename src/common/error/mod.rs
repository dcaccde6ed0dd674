//! Unified error types for Longan.
//!
//! Format-local errors (such as the binary codec's [`BinaryError`]) are
//! converted into the crate-wide [`Error`] so callers deal with one type.
//!
//! [`BinaryError`]: crate::common::binary::BinaryError

// Submodule declarations
pub mod types;
pub mod conversions;

// Re-exports
pub use types::{Error, Result};
