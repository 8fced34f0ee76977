//! Error types for data parsing in colorsensor-types.

use thiserror::Error;

/// Errors that can occur when parsing color sensor payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in colorsensor-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload did not have the exact size the format requires.
    #[error("Invalid payload length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required payload size.
        expected: usize,
        /// Size actually received.
        actual: usize,
    },
}

/// Result type alias using colorsensor-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_length_display() {
        let err = ParseError::InvalidLength {
            expected: 3,
            actual: 5,
        };
        assert_eq!(
            err.to_string(),
            "Invalid payload length: expected 3 bytes, got 5"
        );
    }
}
