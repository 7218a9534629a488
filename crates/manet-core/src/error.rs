//! Error types for the core crate

use thiserror::Error;

/// Errors related to node addresses
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Invalid address format: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_error_display() {
        let err = AddressError::Parse("10.0.x.1".to_string());
        assert_eq!(err.to_string(), "Invalid address format: 10.0.x.1");
    }
}
