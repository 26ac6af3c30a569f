//! Application errors

use tessera_core::{CoreError, ErrorKind};
use tessera_dnr::DnrError;
use tessera_oracle::OracleError;
use tessera_perp::PerpError;
use tessera_store::StoreError;
use thiserror::Error;

/// Result type alias for application operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("no block in progress")]
    NoBlockInProgress,

    #[error("block {0} is still in progress")]
    BlockInProgress(u64),

    #[error("chain already initialized at height {0}")]
    AlreadyInitialized(u64),

    #[error("block time {time_ms} is before the previous block time {previous_ms}")]
    NonMonotonicTime { time_ms: i64, previous_ms: i64 },

    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),

    #[error("unknown epoch: {0}")]
    UnknownEpoch(String),

    /// A message handler panicked; its writes were discarded
    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Perp(#[from] PerpError),

    #[error(transparent)]
    Dnr(#[from] DnrError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoBlockInProgress
            | Self::BlockInProgress(_)
            | Self::AlreadyInitialized(_)
            | Self::NonMonotonicTime { .. } => ErrorKind::StateConflict,
            Self::InvalidGenesis(_) => ErrorKind::InvalidRequest,
            Self::UnknownEpoch(_) => ErrorKind::Unavailable,
            Self::Aborted(_) => ErrorKind::InvariantViolation,
            Self::Oracle(e) => e.kind(),
            Self::Perp(e) => e.kind(),
            Self::Dnr(e) => e.kind(),
            Self::Core(e) => e.kind(),
            Self::Store(e) => tessera_core::error::store_kind(e),
        }
    }

    /// Numeric code used in transaction results
    pub fn code(&self) -> u32 {
        match self {
            Self::NoBlockInProgress => 6001,
            Self::BlockInProgress(_) => 6002,
            Self::AlreadyInitialized(_) => 6003,
            Self::NonMonotonicTime { .. } => 6004,
            Self::InvalidGenesis(_) => 6005,
            Self::UnknownEpoch(_) => 6006,
            Self::Aborted(_) => 6007,
            Self::Oracle(e) => e.code(),
            Self::Perp(e) => e.code(),
            Self::Dnr(e) => e.code(),
            Self::Core(e) => e.code(),
            Self::Store(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_errors_keep_their_codes() {
        let err = AppError::from(DnrError::EpochNotPast { epoch: 2, current: 1 });
        assert_eq!(err.code(), 4001);
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let err = AppError::from(StoreError::OutOfGas {
            limit: 10,
            wanted: 11,
            descriptor: "write".into(),
        });
        assert_eq!(err.code(), 2005);
        assert_eq!(AppError::Aborted("boom".into()).kind(), ErrorKind::InvariantViolation);
    }
}
