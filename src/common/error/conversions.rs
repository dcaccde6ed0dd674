//! Error conversion implementations.
//!
//! This module contains From trait implementations to convert from internal
//! error types to the unified Error type.

use super::types::Error;
use crate::common::binary::BinaryError;

impl From<BinaryError> for Error {
    fn from(err: BinaryError) -> Self {
        match err {
            BinaryError::Io(e) => Error::Io(e),
            BinaryError::UnexpectedEndOfData {
                expected,
                available,
            } => Error::UnexpectedEndOfData {
                expected,
                available,
            },
            BinaryError::Overflow(msg) => Error::CapacityExceeded(msg),
            e @ BinaryError::Unrepresentable { .. } => Error::Encoding(e.to_string()),
            BinaryError::Malformed(msg) => Error::Encoding(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_of_data_maps_through() {
        let err: Error = BinaryError::UnexpectedEndOfData {
            expected: 8,
            available: 3,
        }
        .into();
        assert!(matches!(
            err,
            Error::UnexpectedEndOfData {
                expected: 8,
                available: 3
            }
        ));
    }

    #[test]
    fn test_overflow_is_capacity() {
        let err: Error = BinaryError::Overflow("field".to_string()).into();
        assert!(matches!(err, Error::CapacityExceeded(_)));
    }
}
