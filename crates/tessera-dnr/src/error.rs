//! Error types for discounts and rebates

use tessera_core::{CoreError, DecError, ErrorKind};
use tessera_store::StoreError;
use thiserror::Error;

/// Result type alias for DnR operations
pub type Result<T> = std::result::Result<T, DnrError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnrError {
    /// Rebates can only be withdrawn for epochs that have ended
    #[error("epoch {epoch} has not ended (current epoch {current})")]
    EpochNotPast { epoch: u64, current: u64 },

    #[error("invalid discount: {0}")]
    InvalidDiscount(String),

    #[error("no discount at threshold {0}")]
    DiscountNotFound(String),

    #[error("invalid rebate allocation: {0}")]
    InvalidAllocation(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dec(#[from] DecError),
}

impl DnrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EpochNotPast { .. } => ErrorKind::StateConflict,
            Self::InvalidDiscount(_) | Self::InvalidAllocation(_) => ErrorKind::InvalidRequest,
            Self::DiscountNotFound(_) => ErrorKind::StateConflict,
            Self::Core(e) => e.kind(),
            Self::Store(e) => tessera_core::error::store_kind(e),
            Self::Dec(DecError::Parse { .. }) => ErrorKind::InvalidRequest,
            Self::Dec(_) => ErrorKind::InvariantViolation,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::EpochNotPast { .. } => 4001,
            Self::InvalidDiscount(_) => 4002,
            Self::DiscountNotFound(_) => 4003,
            Self::InvalidAllocation(_) => 4004,
            Self::Core(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Dec(_) => 1008,
        }
    }
}

impl From<DnrError> for CoreError {
    fn from(err: DnrError) -> Self {
        match err {
            DnrError::Core(e) => e,
            DnrError::Store(e) => CoreError::Store(e),
            DnrError::Dec(e) => CoreError::Dec(e),
            other => CoreError::Hook {
                module: "dnr".into(),
                reason: other.to_string(),
            },
        }
    }
}
