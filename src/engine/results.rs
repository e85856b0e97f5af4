// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::market::MarketError;
use crate::risk::RiskError;
use crate::types::{AccountId, BaseAmount, FeePips, MarketId, PositionId, Price, QuoteAmount, Side, SignedSize};
use crate::vamm::{ReserveError, SwapQuote, SwapSettlement};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenResult {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub side: Side,
    pub size: BaseAmount,
    pub entry_price: Price,
    pub notional: QuoteAmount,
    /// Margin recorded on the position, after the fee.
    pub margin: QuoteAmount,
    pub fee: QuoteAmount,
    pub fee_pips: FeePips,
    pub vamm_price_after: Price,
    pub funding: Option<FundingResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseResult {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub size: SignedSize,
    pub entry_price: Price,
    pub exit_price: Price,
    pub realized_pnl: i128,
    pub released: QuoteAmount,
    pub vamm_price_after: Price,
    pub funding: Option<FundingResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginResult {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub new_margin: QuoteAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingResult {
    pub market_id: MarketId,
    /// Hourly rate added to the index
    pub funding_rate: i128,
    pub instantaneous_rate: i128,
    pub global_funding_index: i128,
    pub mark_price: Price,
    pub reference_price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapExecution {
    pub market_id: MarketId,
    pub quote: SwapQuote,
    pub settlement: SwapSettlement,
    pub fee_pips: FeePips,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentOutcome {
    Opened(OpenResult),
    Closed(CloseResult),
    MarginAdjusted(MarginResult),
}

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Rejected before any mutation. Adjust the intent and retry.
    Admission,
    /// Caller lacks the right to do this.
    Authorization,
    /// Operation is never allowed, or state would break.
    Invariant,
    /// A ledger or vault refused.
    Collaborator,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Market error: {0}")]
    Market(#[from] MarketError),

    #[error("Risk check failed: {0}")]
    Risk(#[from] RiskError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Reserve error: {0}")]
    Reserve(#[from] ReserveError),

    #[error("Caller {caller:?} is not the operator")]
    Unauthorized { caller: AccountId },

    #[error("Position {position_id:?} is not owned by {caller:?}")]
    NotPositionOwner { position_id: PositionId, caller: AccountId },

    #[error("Position {position_id:?} belongs to market {actual:?}, not {requested:?}")]
    PositionMarketMismatch {
        position_id: PositionId,
        requested: MarketId,
        actual: MarketId,
    },

    #[error("Trade size must be positive")]
    ZeroSize,

    #[error("Trade size {size} exceeds max {max}")]
    TradeTooLarge { size: BaseAmount, max: BaseAmount },

    #[error("Margin must be positive")]
    ZeroMargin,

    #[error("Slippage exceeded: mark {price} beyond limit {limit}")]
    SlippageExceeded { limit: Price, price: Price },

    #[error("Liquidity operations are not allowed on a virtual AMM")]
    LiquidityOperationNotAllowed,

    #[error("Rebalance moves price {deviation_bps} bps (max {max_bps})")]
    RebalanceTooLarge { deviation_bps: u32, max_bps: u32 },

    #[error("Math overflow")]
    MathOverflow,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Market(MarketError::Overflow) => ErrorKind::Invariant,
            EngineError::Market(_) => ErrorKind::Admission,
            EngineError::Risk(_) => ErrorKind::Admission,
            EngineError::Ledger(_) => ErrorKind::Collaborator,
            EngineError::Config(_) => ErrorKind::Invariant,
            EngineError::Reserve(_) => ErrorKind::Invariant,
            EngineError::Unauthorized { .. } | EngineError::NotPositionOwner { .. } => ErrorKind::Authorization,
            EngineError::PositionMarketMismatch { .. }
            | EngineError::ZeroSize
            | EngineError::TradeTooLarge { .. }
            | EngineError::ZeroMargin
            | EngineError::SlippageExceeded { .. }
            | EngineError::RebalanceTooLarge { .. } => ErrorKind::Admission,
            EngineError::LiquidityOperationNotAllowed | EngineError::MathOverflow => ErrorKind::Invariant,
        }
    }

    pub fn is_admission(&self) -> bool {
        self.kind() == ErrorKind::Admission
    }
}
