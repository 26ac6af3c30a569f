//! Error types for the key-value layer

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the key-value context and typed collections
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Requested entry does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Value could not be encoded
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Stored bytes could not be decoded
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Key bytes are malformed for the expected key type
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Gas limit exceeded
    #[error("out of gas in {descriptor}: limit {limit}, wanted {wanted}")]
    OutOfGas {
        limit: u64,
        wanted: u64,
        descriptor: String,
    },
}

impl StoreError {
    /// Numeric code used in transaction results
    pub fn code(&self) -> u32 {
        match self {
            Self::NotFound(_) => 2001,
            Self::Encoding(_) => 2002,
            Self::Decoding(_) => 2003,
            Self::InvalidKey(_) => 2004,
            Self::OutOfGas { .. } => 2005,
        }
    }

    /// Missing entries are ordinary lookups failing, not corruption
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Corrupted or unencodable state; the host must halt the transaction
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Encoding(_) | Self::Decoding(_) | Self::InvalidKey(_)
        )
    }
}
