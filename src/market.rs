//! Market records and the store that owns them.
//!
//! A market is one trading pair: its virtual reserves, funding index, open
//! interest and risk parameters. The store is the single authority for reads and
//! writes. Markets are created once and never removed, only deactivated.

use crate::math;
use crate::types::{BaseAmount, FeePips, FeedId, MarketId, Price, QuoteAmount, Side, Timestamp};
use crate::vamm::VirtualReserves;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-market risk and fee knobs. Fixed at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    /// Cap on each side's open interest
    pub max_oi_cap: QuoteAmount,
    pub max_leverage: u32,
    /// Margin floor regardless of leverage
    pub min_margin: QuoteAmount,
    /// Largest single trade. keeps size * price far from overflow
    pub max_trade_size: BaseAmount,
    pub base_fee_pips: FeePips,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            max_oi_cap: QuoteAmount::from_whole(10_000_000),
            max_leverage: 20,
            min_margin: QuoteAmount::from_whole(10),
            max_trade_size: BaseAmount::from_whole(10_000),
            base_fee_pips: FeePips(3_000),
        }
    }
}

impl MarketParams {
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.max_leverage == 0 {
            return Err(MarketError::InvalidParams("max leverage must be at least 1x".to_string()));
        }
        if self.max_oi_cap.is_zero() {
            return Err(MarketError::InvalidParams("open interest cap must be positive".to_string()));
        }
        if self.max_trade_size.is_zero() {
            return Err(MarketError::InvalidParams("max trade size must be positive".to_string()));
        }
        if self.base_fee_pips.value() >= math::PIPS_DENOMINATOR {
            return Err(MarketError::InvalidParams("base fee must be below 100%".to_string()));
        }
        Ok(())
    }
}

/// One market's full state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub virtual_base: BaseAmount,
    pub virtual_quote: QuoteAmount,
    /// Invariant at the last explicit reset. Trades read it, never write it.
    pub k: U256,
    /// Cumulative hourly funding rate, 1e18 precision. Positive = longs pay shorts.
    pub global_funding_index: i128,
    /// Hourly rate added at the last accrual.
    pub last_funding_rate: i128,
    /// Unscaled mark/spot spread seen at the last accrual. Drives the dynamic fee.
    pub instantaneous_funding_rate: i128,
    pub total_long_oi: QuoteAmount,
    pub total_short_oi: QuoteAmount,
    pub last_funding_time: Timestamp,
    pub spot_price_feed: Option<FeedId>,
    pub is_active: bool,
    pub params: MarketParams,
    pub fees_accrued: QuoteAmount,
    pub created_at: Timestamp,
    pub last_updated: Timestamp,
}

impl Market {
    pub fn new(
        id: MarketId,
        reserves: VirtualReserves,
        params: MarketParams,
        spot_price_feed: Option<FeedId>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            virtual_base: reserves.base,
            virtual_quote: reserves.quote,
            k: reserves.k,
            global_funding_index: 0,
            last_funding_rate: 0,
            instantaneous_funding_rate: 0,
            total_long_oi: QuoteAmount::zero(),
            total_short_oi: QuoteAmount::zero(),
            last_funding_time: timestamp,
            spot_price_feed,
            is_active: true,
            params,
            fees_accrued: QuoteAmount::zero(),
            created_at: timestamp,
            last_updated: timestamp,
        }
    }

    pub fn reserves(&self) -> VirtualReserves {
        VirtualReserves {
            base: self.virtual_base,
            quote: self.virtual_quote,
            k: self.k,
        }
    }

    /// Raw constant-product price, before any spot blending.
    pub fn vamm_price(&self) -> Option<Price> {
        math::reserve_price(self.virtual_base, self.virtual_quote)
    }

    /// How far `base * quote` sits below `k` after truncating trades.
    pub fn invariant_drift(&self) -> U256 {
        self.k.saturating_sub(math::invariant(self.virtual_base, self.virtual_quote))
    }

    // trade path: reserves move, k stays
    pub fn apply_trade_reserves(&mut self, reserves: VirtualReserves, timestamp: Timestamp) {
        debug_assert_eq!(reserves.k, self.k);
        self.virtual_base = reserves.base;
        self.virtual_quote = reserves.quote;
        self.last_updated = timestamp;
    }

    // admin path: k is redefined from the new reserves
    pub fn reset_reserves(&mut self, reserves: VirtualReserves, timestamp: Timestamp) {
        self.virtual_base = reserves.base;
        self.virtual_quote = reserves.quote;
        self.k = reserves.k;
        self.last_updated = timestamp;
    }

    pub fn open_interest(&self, side: Side) -> QuoteAmount {
        match side {
            Side::Long => self.total_long_oi,
            Side::Short => self.total_short_oi,
        }
    }

    pub fn add_open_interest(&mut self, side: Side, amount: QuoteAmount) -> Result<(), MarketError> {
        let slot = self.open_interest_mut(side);
        *slot = slot.checked_add(amount).ok_or(MarketError::Overflow)?;
        Ok(())
    }

    /// Never goes below zero.
    pub fn reduce_open_interest(&mut self, side: Side, amount: QuoteAmount) {
        let slot = self.open_interest_mut(side);
        *slot = slot.saturating_sub(amount);
    }

    pub fn total_open_interest(&self) -> QuoteAmount {
        self.total_long_oi
            .checked_add(self.total_short_oi)
            .unwrap_or(QuoteAmount::new(U256::MAX))
    }

    pub fn accrue_fee(&mut self, fee: QuoteAmount) {
        self.fees_accrued = self
            .fees_accrued
            .checked_add(fee)
            .unwrap_or(QuoteAmount::new(U256::MAX));
    }

    fn open_interest_mut(&mut self, side: Side) -> &mut QuoteAmount {
        match side {
            Side::Long => &mut self.total_long_oi,
            Side::Short => &mut self.total_short_oi,
        }
    }
}

/// Keyed table of markets. Mutable access always checks the market is active.
#[derive(Debug, Clone, Default)]
pub struct MarketStore {
    markets: HashMap<MarketId, Market>,
}

impl MarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, market_id: MarketId) -> bool {
        self.markets.contains_key(&market_id)
    }

    pub fn insert(&mut self, market: Market) -> Result<(), MarketError> {
        if self.markets.contains_key(&market.id) {
            return Err(MarketError::AlreadyExists(market.id));
        }
        self.markets.insert(market.id, market);
        Ok(())
    }

    pub fn get(&self, market_id: MarketId) -> Result<&Market, MarketError> {
        self.markets
            .get(&market_id)
            .ok_or(MarketError::NotFound(market_id))
    }

    pub fn get_active(&self, market_id: MarketId) -> Result<&Market, MarketError> {
        let market = self.get(market_id)?;
        if !market.is_active {
            return Err(MarketError::Inactive(market_id));
        }
        Ok(market)
    }

    pub fn get_active_mut(&mut self, market_id: MarketId) -> Result<&mut Market, MarketError> {
        let market = self.get_mut(market_id)?;
        if !market.is_active {
            return Err(MarketError::Inactive(market_id));
        }
        Ok(market)
    }

    // status changes only. everything else goes through get_active_mut
    pub fn get_mut(&mut self, market_id: MarketId) -> Result<&mut Market, MarketError> {
        self.markets
            .get_mut(&market_id)
            .ok_or(MarketError::NotFound(market_id))
    }

    pub fn snapshot(&self, market_id: MarketId) -> Result<Market, MarketError> {
        self.get(market_id).cloned()
    }

    pub fn ids(&self) -> Vec<MarketId> {
        let mut ids: Vec<MarketId> = self.markets.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("Market {0:?} not found")]
    NotFound(MarketId),

    #[error("Market {0:?} is not active")]
    Inactive(MarketId),

    #[error("Market {0:?} already exists")]
    AlreadyExists(MarketId),

    #[error("Virtual reserves must both be positive")]
    InvalidReserves,

    #[error("Invalid market params: {0}")]
    InvalidParams(String),

    #[error("Open interest overflow")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_market() -> Market {
        let reserves =
            VirtualReserves::new(BaseAmount::from_whole(1000), QuoteAmount::from_whole(2_000_000)).unwrap();
        Market::new(MarketId(1), reserves, MarketParams::default(), None, Timestamp::from_millis(0))
    }

    #[test]
    fn default_params_valid() {
        assert!(MarketParams::default().validate().is_ok());

        let mut params = MarketParams::default();
        params.max_leverage = 0;
        assert!(matches!(params.validate(), Err(MarketError::InvalidParams(_))));
    }

    #[test]
    fn market_initialization() {
        let market = test_market();
        assert!(market.is_active);
        assert_eq!(market.vamm_price(), Some(Price::from_whole(2000)));
        assert_eq!(market.global_funding_index, 0);
        assert_eq!(market.total_long_oi, QuoteAmount::zero());
        assert_eq!(market.invariant_drift(), U256::zero());
    }

    #[test]
    fn open_interest_never_negative() {
        let mut market = test_market();
        market.add_open_interest(Side::Long, QuoteAmount::from_whole(100)).unwrap();
        market.reduce_open_interest(Side::Long, QuoteAmount::from_whole(150));
        assert_eq!(market.total_long_oi, QuoteAmount::zero());

        market.add_open_interest(Side::Short, QuoteAmount::from_whole(40)).unwrap();
        assert_eq!(market.total_open_interest(), QuoteAmount::from_whole(40));
    }

    #[test]
    fn trade_reserves_keep_k() {
        let mut market = test_market();
        let k = market.k;
        let moved = market.reserves().after_open_long(QuoteAmount::from_whole(7)).unwrap();
        market.apply_trade_reserves(moved, Timestamp::from_millis(1));
        assert_eq!(market.k, k);
        // truncation leaves the product at or below k
        assert!(market.invariant_drift() < market.virtual_quote.raw());
    }

    #[test]
    fn store_enforces_active() {
        let mut store = MarketStore::new();
        store.insert(test_market()).unwrap();
        assert!(matches!(store.insert(test_market()), Err(MarketError::AlreadyExists(_))));

        assert!(store.get_active(MarketId(1)).is_ok());
        store.get_mut(MarketId(1)).unwrap().is_active = false;
        assert_eq!(store.get_active(MarketId(1)).unwrap_err(), MarketError::Inactive(MarketId(1)));
        assert!(store.get_active_mut(MarketId(1)).is_err());
        assert!(store.get(MarketId(1)).is_ok());

        assert_eq!(store.get(MarketId(9)).unwrap_err(), MarketError::NotFound(MarketId(9)));
    }
}
