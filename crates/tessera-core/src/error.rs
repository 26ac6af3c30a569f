//! Error types shared by every Tessera module

use crate::dec::DecError;
use tessera_store::StoreError;
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Coarse classification every module error maps into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed sender, pair, amount or argument; rejected before any state change
    InvalidRequest,
    /// Request conflicts with current state (market disabled, same multiplier, ...)
    StateConflict,
    /// Broken internal invariant; a programming error
    InvariantViolation,
    /// Sender lacks the required role
    Unauthorized,
    /// A required input (oracle price, snapshot) is missing
    Unavailable,
    /// Store corruption; the host halts the transaction
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::StateConflict => "state_conflict",
            Self::InvariantViolation => "invariant_violation",
            Self::Unauthorized => "unauthorized",
            Self::Unavailable => "unavailable",
            Self::Fatal => "fatal",
        }
    }
}

/// Errors raised by the core types and host keepers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    // === Parsing ===
    #[error("invalid asset pair: {0}")]
    InvalidPair(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid coins: {0}")]
    InvalidCoins(String),

    // === Host keepers ===
    /// Account balance too small for a transfer
    #[error("insufficient funds in {account}: need {needed}, have {available}")]
    InsufficientFunds {
        account: String,
        needed: String,
        available: String,
    },

    #[error("unknown validator: {0}")]
    UnknownValidator(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("no price for {0}")]
    PriceUnavailable(String),

    /// Failure inside an epoch hook of another module
    #[error("hook {module} failed: {reason}")]
    Hook { module: String, reason: String },

    // === Wrapped ===
    #[error(transparent)]
    Dec(#[from] DecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("event encoding: {0}")]
    Event(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPair(_) | Self::InvalidAddress(_) | Self::InvalidCoins(_) => {
                ErrorKind::InvalidRequest
            }
            Self::InsufficientFunds { .. } => ErrorKind::StateConflict,
            Self::UnknownValidator(_) => ErrorKind::InvalidRequest,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::PriceUnavailable(_) => ErrorKind::Unavailable,
            Self::Hook { .. } => ErrorKind::StateConflict,
            Self::Dec(DecError::Parse { .. }) => ErrorKind::InvalidRequest,
            Self::Dec(_) => ErrorKind::InvariantViolation,
            Self::Store(e) => store_kind(e),
            Self::Event(_) => ErrorKind::Fatal,
        }
    }

    /// Numeric code used in transaction results
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidPair(_) => 1001,
            Self::InvalidAddress(_) => 1002,
            Self::InvalidCoins(_) => 1003,
            Self::InsufficientFunds { .. } => 1004,
            Self::UnknownValidator(_) => 1005,
            Self::Unauthorized(_) => 1006,
            Self::Hook { .. } => 1007,
            Self::Dec(_) => 1008,
            Self::Store(e) => e.code(),
            Self::Event(_) => 1009,
            Self::PriceUnavailable(_) => 1010,
        }
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, Self::InsufficientFunds { .. })
    }
}

/// Kind of a raw store error
pub fn store_kind(err: &StoreError) -> ErrorKind {
    match err {
        StoreError::NotFound(_) => ErrorKind::Unavailable,
        StoreError::OutOfGas { .. } => ErrorKind::InvalidRequest,
        _ => ErrorKind::Fatal,
    }
}
