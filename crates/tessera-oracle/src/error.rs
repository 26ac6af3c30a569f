//! Error types for the oracle module

use tessera_core::{AssetPair, CoreError, DecError, ErrorKind, ValAddress};
use tessera_store::StoreError;
use thiserror::Error;

/// Result type alias for oracle operations
pub type Result<T> = std::result::Result<T, OracleError>;

/// Errors that can occur in oracle voting and tallying
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    // === Message validation ===
    #[error("invalid oracle params: {0}")]
    InvalidParams(String),

    #[error("invalid exchange rates: {0}")]
    InvalidRates(String),

    #[error("duplicate pair in vote: {0}")]
    DuplicatePair(AssetPair),

    #[error("pair is not whitelisted: {0}")]
    UnknownPair(AssetPair),

    #[error("invalid salt: {0}")]
    InvalidSalt(String),

    #[error("invalid vote hash: {0}")]
    InvalidHash(String),

    #[error("invalid reward allocation: {0}")]
    InvalidReward(String),

    // === Voting state ===
    /// Vote revealed without a matching prevote
    #[error("no aggregate prevote for {0}")]
    NoAggregatePrevote(ValAddress),

    /// Vote not in the period right after its prevote
    #[error("reveal period mismatch: prevote in period {prevote_period}, vote in period {vote_period}")]
    RevealPeriodMismatch {
        prevote_period: u64,
        vote_period: u64,
    },

    /// Revealed rates do not hash to the committed prevote
    #[error("vote hash verification failed: committed {committed}, revealed {revealed}")]
    VerificationFailed { committed: String, revealed: String },

    // === Authorization ===
    #[error("{feeder} may not vote for {validator}")]
    NoVotingPermission { feeder: String, validator: String },

    #[error("validator is not active: {0}")]
    ValidatorNotActive(ValAddress),

    #[error("sender {sender} is not the operator of {validator}")]
    NotOperator { sender: String, validator: String },

    // === Queries ===
    #[error("no price for {0}")]
    PriceUnavailable(AssetPair),

    /// Tally over a ballot with no voting power
    #[error("empty ballot for {0}")]
    EmptyBallot(AssetPair),

    // === Wrapped ===
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dec(#[from] DecError),
}

impl OracleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParams(_)
            | Self::InvalidRates(_)
            | Self::DuplicatePair(_)
            | Self::UnknownPair(_)
            | Self::InvalidSalt(_)
            | Self::InvalidHash(_)
            | Self::InvalidReward(_)
            | Self::VerificationFailed { .. } => ErrorKind::InvalidRequest,
            Self::NoAggregatePrevote(_) | Self::RevealPeriodMismatch { .. } => {
                ErrorKind::StateConflict
            }
            Self::NoVotingPermission { .. }
            | Self::ValidatorNotActive(_)
            | Self::NotOperator { .. } => ErrorKind::Unauthorized,
            Self::PriceUnavailable(_) => ErrorKind::Unavailable,
            Self::EmptyBallot(_) => ErrorKind::InvariantViolation,
            Self::Core(e) => e.kind(),
            Self::Store(e) => tessera_core::error::store_kind(e),
            Self::Dec(DecError::Parse { .. }) => ErrorKind::InvalidRequest,
            Self::Dec(_) => ErrorKind::InvariantViolation,
        }
    }

    /// Numeric code used in transaction results
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidParams(_) => 3001,
            Self::InvalidRates(_) => 3002,
            Self::DuplicatePair(_) => 3003,
            Self::UnknownPair(_) => 3004,
            Self::InvalidSalt(_) => 3005,
            Self::InvalidHash(_) => 3006,
            Self::InvalidReward(_) => 3007,
            Self::NoAggregatePrevote(_) => 3008,
            Self::RevealPeriodMismatch { .. } => 3009,
            Self::VerificationFailed { .. } => 3010,
            Self::NoVotingPermission { .. } => 3011,
            Self::ValidatorNotActive(_) => 3012,
            Self::NotOperator { .. } => 3013,
            Self::PriceUnavailable(_) => 3014,
            Self::EmptyBallot(_) => 3015,
            Self::Core(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Dec(_) => 1008,
        }
    }
}

impl From<OracleError> for CoreError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Core(e) => e,
            OracleError::Store(e) => CoreError::Store(e),
            OracleError::Dec(e) => CoreError::Dec(e),
            OracleError::PriceUnavailable(pair) => CoreError::PriceUnavailable(pair.to_string()),
            other => CoreError::Hook {
                module: "oracle".into(),
                reason: other.to_string(),
            },
        }
    }
}
