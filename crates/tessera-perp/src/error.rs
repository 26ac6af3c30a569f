//! Error types for the perp module

use tessera_core::{AssetPair, CoreError, DecError, ErrorKind};
use tessera_store::StoreError;
use thiserror::Error;

/// Result type alias for perp operations
pub type Result<T> = std::result::Result<T, PerpError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PerpError {
    // === Message validation ===
    #[error("invalid market params: {0}")]
    InvalidMarket(String),

    #[error("invalid amm: {0}")]
    InvalidAmm(String),

    #[error("quote amount must be positive")]
    InputQuoteAmountNotPositive,

    #[error("base amount must not be negative")]
    InputBaseAmountNegative,

    #[error("leverage must be at least 1, got {0}")]
    LeverageTooLow(String),

    #[error("leverage {leverage} exceeds max leverage {max}")]
    LeverageTooHigh { leverage: String, max: String },

    #[error("wrong collateral denom: expected {expected}, got {got}")]
    InvalidCollateral { expected: String, got: String },

    #[error("invalid denom: {0:?}")]
    InvalidDenom(String),

    // === Market state ===
    #[error("market not found: {0}")]
    MarketNotFound(AssetPair),

    #[error("market {pair} version {version} not found")]
    MarketVersionNotFound { pair: AssetPair, version: u64 },

    #[error("market is not enabled: {0}")]
    MarketNotEnabled(AssetPair),

    #[error("market is already enabled: {0}")]
    MarketAlreadyEnabled(AssetPair),

    #[error("market must be closed before settling: {0}")]
    MarketStillEnabled(AssetPair),

    #[error("peg multiplier is already {0}")]
    SamePegMultiplier(String),

    #[error("quote reserve would reach zero")]
    QuoteReserveAtZero,

    #[error("base reserve would reach zero")]
    BaseReserveAtZero,

    #[error("liquidity depth overflows the decimal range")]
    LiquidityDepthOverflow,

    #[error("ecosystem fund cannot pay {0}")]
    NotEnoughFundToPay(String),

    // === Position state ===
    #[error("no position for {trader} in {pair}")]
    PositionNotFound { pair: AssetPair, trader: String },

    #[error("position has zero size")]
    PositionZeroSize,

    #[error("swap result {amount} fails limit {limit}")]
    AssetFailsUserLimit { amount: String, limit: String },

    #[error("mark price {price} moved more than {limit} from {reference}")]
    OverFluctuationLimit {
        price: String,
        reference: String,
        limit: String,
    },

    #[error("mark price {mark} is too far from index price {index}")]
    OracleSpreadTooWide { mark: String, index: String },

    #[error("margin ratio {ratio} is below {required}")]
    MarginRatioTooLow { ratio: String, required: String },

    #[error("position would carry bad debt of {0}")]
    BadDebt(String),

    #[error("position is healthy, margin ratio {0}")]
    PositionHealthy(String),

    #[error("every liquidation failed: {0}")]
    AllLiquidationsFailed(String),

    // === Authorization ===
    #[error("{0} is not a whitelisted liquidator")]
    UnauthorizedLiquidator(String),

    // === Wrapped ===
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dec(#[from] DecError),
}

impl PerpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMarket(_)
            | Self::InvalidAmm(_)
            | Self::InputQuoteAmountNotPositive
            | Self::InputBaseAmountNegative
            | Self::LeverageTooLow(_)
            | Self::LeverageTooHigh { .. }
            | Self::InvalidCollateral { .. }
            | Self::InvalidDenom(_)
            | Self::AssetFailsUserLimit { .. } => ErrorKind::InvalidRequest,
            Self::MarketNotFound(_)
            | Self::MarketVersionNotFound { .. }
            | Self::MarketNotEnabled(_)
            | Self::MarketAlreadyEnabled(_)
            | Self::MarketStillEnabled(_)
            | Self::SamePegMultiplier(_)
            | Self::QuoteReserveAtZero
            | Self::BaseReserveAtZero
            | Self::LiquidityDepthOverflow
            | Self::NotEnoughFundToPay(_)
            | Self::PositionNotFound { .. }
            | Self::PositionZeroSize
            | Self::OverFluctuationLimit { .. }
            | Self::MarginRatioTooLow { .. }
            | Self::BadDebt(_)
            | Self::PositionHealthy(_)
            | Self::AllLiquidationsFailed(_) => ErrorKind::StateConflict,
            Self::OracleSpreadTooWide { .. } => ErrorKind::Unavailable,
            Self::UnauthorizedLiquidator(_) => ErrorKind::Unauthorized,
            Self::Core(e) => e.kind(),
            Self::Store(e) => tessera_core::error::store_kind(e),
            Self::Dec(DecError::Parse { .. }) => ErrorKind::InvalidRequest,
            Self::Dec(_) => ErrorKind::InvariantViolation,
        }
    }

    /// Numeric code used in transaction results
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidMarket(_) => 5001,
            Self::InvalidAmm(_) => 5002,
            Self::InputQuoteAmountNotPositive => 5003,
            Self::InputBaseAmountNegative => 5004,
            Self::LeverageTooLow(_) => 5005,
            Self::LeverageTooHigh { .. } => 5006,
            Self::InvalidCollateral { .. } => 5007,
            Self::InvalidDenom(_) => 5008,
            Self::MarketNotFound(_) => 5009,
            Self::MarketVersionNotFound { .. } => 5010,
            Self::MarketNotEnabled(_) => 5011,
            Self::MarketAlreadyEnabled(_) => 5012,
            Self::MarketStillEnabled(_) => 5013,
            Self::SamePegMultiplier(_) => 5014,
            Self::QuoteReserveAtZero => 5015,
            Self::BaseReserveAtZero => 5016,
            Self::LiquidityDepthOverflow => 5017,
            Self::NotEnoughFundToPay(_) => 5018,
            Self::PositionNotFound { .. } => 5019,
            Self::PositionZeroSize => 5020,
            Self::AssetFailsUserLimit { .. } => 5021,
            Self::OverFluctuationLimit { .. } => 5022,
            Self::OracleSpreadTooWide { .. } => 5023,
            Self::MarginRatioTooLow { .. } => 5024,
            Self::BadDebt(_) => 5025,
            Self::PositionHealthy(_) => 5026,
            Self::AllLiquidationsFailed(_) => 5027,
            Self::UnauthorizedLiquidator(_) => 5028,
            Self::Core(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Dec(_) => 1008,
        }
    }
}

impl From<PerpError> for CoreError {
    fn from(err: PerpError) -> Self {
        match err {
            PerpError::Core(e) => e,
            PerpError::Store(e) => CoreError::Store(e),
            PerpError::Dec(e) => CoreError::Dec(e),
            other => CoreError::Hook {
                module: "perp".into(),
                reason: other.to_string(),
            },
        }
    }
}
