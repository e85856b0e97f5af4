// 11.0: every state change produces an event. observers can rebuild market state from the
// stream without reading the engine: each payload carries the quantities that changed.

use crate::types::{AccountId, BaseAmount, FeePips, MarketId, PositionId, Price, QuoteAmount, SignedSize, Timestamp};
use crate::vamm::{BalanceDelta, SwapDirection};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    pub fn market_id(&self) -> Option<MarketId> {
        match &self.payload {
            EventPayload::MarketInitialized(e) => Some(e.market_id),
            EventPayload::ReservesUpdated(e) => Some(e.market_id),
            EventPayload::FundingIndexUpdated(e) => Some(e.market_id),
            EventPayload::PositionOpened(e) => Some(e.market_id),
            EventPayload::PositionClosed(e) => Some(e.market_id),
            EventPayload::MarginAdjusted(e) => Some(e.market_id),
            EventPayload::SwapSettled(e) => Some(e.market_id),
            EventPayload::MarketStatusChanged(e) => Some(e.market_id),
            EventPayload::OperatorTransferred(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    // Market lifecycle
    MarketInitialized(MarketInitializedEvent),
    MarketStatusChanged(MarketStatusChangedEvent),

    // Curve and funding
    ReservesUpdated(ReservesUpdatedEvent),
    FundingIndexUpdated(FundingIndexUpdatedEvent),

    // Positions
    PositionOpened(PositionOpenedEvent),
    PositionClosed(PositionClosedEvent),
    MarginAdjusted(MarginAdjustedEvent),

    // Raw pool swaps
    SwapSettled(SwapSettledEvent),

    // Admin
    OperatorTransferred(OperatorTransferredEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInitializedEvent {
    pub market_id: MarketId,
    pub virtual_base: BaseAmount,
    pub virtual_quote: QuoteAmount,
    pub k: U256,
    pub initial_price: Price,
    /// False when the oracle had no price and the configured default seeded the market.
    pub seeded_from_oracle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveChangeReason {
    PositionOpened,
    PositionClosed,
    AdminReset,
    AdminLiquidityAdded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservesUpdatedEvent {
    pub market_id: MarketId,
    pub virtual_base: BaseAmount,
    pub virtual_quote: QuoteAmount,
    pub k: U256,
    pub vamm_price: Price,
    pub total_long_oi: QuoteAmount,
    pub total_short_oi: QuoteAmount,
    pub reason: ReserveChangeReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingIndexUpdatedEvent {
    pub market_id: MarketId,
    pub funding_rate: i128,
    pub global_funding_index: i128,
    pub mark_price: Price,
    /// The price the rate was measured against: trusted spot, or mark when spot was unusable.
    pub reference_price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub market_id: MarketId,
    pub position_id: PositionId,
    pub trader: AccountId,
    pub size: SignedSize,
    pub entry_price: Price,
    pub notional: QuoteAmount,
    pub margin: QuoteAmount,
    pub fee: QuoteAmount,
    pub fee_pips: FeePips,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub market_id: MarketId,
    pub position_id: PositionId,
    pub trader: AccountId,
    pub size: SignedSize,
    pub entry_price: Price,
    pub exit_price: Price,
    pub realized_pnl: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginAdjustedEvent {
    pub market_id: MarketId,
    pub position_id: PositionId,
    pub trader: AccountId,
    /// Positive when margin was added.
    pub delta: i128,
    pub new_margin: QuoteAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSettledEvent {
    pub market_id: MarketId,
    pub direction: SwapDirection,
    pub price: Price,
    pub amount_in: U256,
    pub amount_out: U256,
    pub fee: QuoteAmount,
    pub trader_delta: BalanceDelta,
    pub hook_delta: BalanceDelta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStatusChangedEvent {
    pub market_id: MarketId,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorTransferredEvent {
    pub previous: AccountId,
    pub new: AccountId,
}
