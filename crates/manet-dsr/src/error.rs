//! Error types for the DSR engine
//!
//! None of these escape the engine's packet handlers: a [`ParseError`] drops
//! the offending packet and bumps a counter, a [`SendBufferError`] is a
//! counted drop. They are returned by the component APIs so that callers
//! and tests can see exactly why something was refused.

use thiserror::Error;

/// Top-level error type for the DSR engine
#[derive(Debug, Error)]
pub enum DsrError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Send buffer error: {0}")]
    SendBuffer(#[from] SendBufferError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Malformed or unsupported DSR header contents
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Truncated header: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("Unknown option type: {0}")]
    UnknownOption(u8),

    #[error("Unsupported option type: {0}")]
    UnsupportedOption(u8),

    #[error("Invalid length {length} for option type {kind}")]
    InvalidOptionLength { kind: u8, length: u8 },

    #[error("Declared payload length {declared} exceeds the {available} bytes available")]
    PayloadLengthMismatch { declared: usize, available: usize },

    #[error("Segments left {segments_left} exceeds the {hops} hops in the source route")]
    SegmentsLeftOutOfRange { segments_left: u8, hops: usize },
}

/// Errors from the send buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendBufferError {
    #[error("Send buffer full ({packets} packets, {bytes} bytes)")]
    Full { packets: usize, bytes: usize },
}

/// Invalid engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for DSR operations
pub type DsrResult<T> = Result<T, DsrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError::Truncated {
            needed: 4,
            remaining: 1,
        };
        assert_eq!(
            err.to_string(),
            "Truncated header: needed 4 bytes, 1 remaining"
        );

        let err = ParseError::UnknownOption(9);
        assert_eq!(err.to_string(), "Unknown option type: 9");

        let err = SendBufferError::Full {
            packets: 50,
            bytes: 0,
        };
        assert_eq!(err.to_string(), "Send buffer full (50 packets, 0 bytes)");
    }

    #[test]
    fn test_error_conversion() {
        let err: DsrError = ParseError::UnsupportedOption(5).into();
        assert!(matches!(err, DsrError::Parse(ParseError::UnsupportedOption(5))));

        let err: DsrError = ConfigError::Invalid("mtu is zero".into()).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: mtu is zero"
        );
    }
}
