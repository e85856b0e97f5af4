//! Price queries. None of these mutate state, and none fail because of the oracle.

use super::core::Engine;
use super::results::EngineError;
use crate::funding;
use crate::ledger::PositionLedger;
use crate::market::{Market, MarketError};
use crate::oracle::PriceBreakdown;
use crate::types::{FeePips, MarketId, Price, Side};

impl<L: PositionLedger> Engine<L> {
    /// Blended price trades execute at. Raw vAMM price when spot is unavailable or distrusted.
    pub fn get_mark_price(&self, market_id: MarketId) -> Result<Price, EngineError> {
        Ok(self.get_price_breakdown(market_id)?.mark_price)
    }

    pub fn get_price_breakdown(&self, market_id: MarketId) -> Result<PriceBreakdown, EngineError> {
        let market = self.markets.get(market_id)?;
        self.breakdown_for(market)
    }

    pub fn get_market_state(&self, market_id: MarketId) -> Result<Market, EngineError> {
        Ok(self.markets.snapshot(market_id)?)
    }

    /// Per-trade fee a `side` trade would pay right now.
    pub fn dynamic_fee(&self, market_id: MarketId, side: Side) -> Result<FeePips, EngineError> {
        let market = self.markets.get(market_id)?;
        Ok(self.fee_for(market, side))
    }

    pub(super) fn breakdown_for(&self, market: &Market) -> Result<PriceBreakdown, EngineError> {
        let vamm_price = market.vamm_price().ok_or(MarketError::InvalidReserves)?;
        Ok(self
            .oracle
            .breakdown(market.id, market.spot_price_feed.as_ref(), vamm_price))
    }

    pub(super) fn fee_for(&self, market: &Market, side: Side) -> FeePips {
        funding::dynamic_fee(
            market.params.base_fee_pips,
            market.instantaneous_funding_rate,
            side,
            &self.config.fees,
        )
    }
}
