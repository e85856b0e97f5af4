//! Operator-only operations: reserve rebalancing, market status, operator handover.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{
    EventPayload, MarketStatusChangedEvent, OperatorTransferredEvent, ReserveChangeReason, ReservesUpdatedEvent,
};
use crate::ledger::PositionLedger;
use crate::market::MarketError;
use crate::math;
use crate::types::{AccountId, BaseAmount, MarketId, Price, QuoteAmount};
use crate::vamm::VirtualReserves;
use tracing::info;

impl<L: PositionLedger> Engine<L> {
    /// Replace both reserves outright. `k` is recomputed. No price bound.
    pub fn set_virtual_reserves(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        virtual_base: BaseAmount,
        virtual_quote: QuoteAmount,
    ) -> Result<Price, EngineError> {
        self.require_operator(caller)?;
        let reserves = VirtualReserves::new(virtual_base, virtual_quote).ok_or(MarketError::InvalidReserves)?;
        let price = reserves.price().ok_or(MarketError::InvalidReserves)?;
        self.commit_rebalance(market_id, reserves, ReserveChangeReason::AdminReset)?;
        Ok(price)
    }

    /// Deepen (or shift) the curve by adding to both reserves. `k` is recomputed and the
    /// price may move at most `max_rebalance_deviation_bps`.
    pub fn add_virtual_liquidity(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        base_added: BaseAmount,
        quote_added: QuoteAmount,
    ) -> Result<Price, EngineError> {
        self.require_operator(caller)?;
        if base_added.is_zero() && quote_added.is_zero() {
            return Err(MarketError::InvalidReserves.into());
        }

        let market = self.markets.get_active(market_id)?;
        let current = market.vamm_price().ok_or(MarketError::InvalidReserves)?;
        let base = market
            .virtual_base
            .checked_add(base_added)
            .ok_or(EngineError::MathOverflow)?;
        let quote = market
            .virtual_quote
            .checked_add(quote_added)
            .ok_or(EngineError::MathOverflow)?;
        let reserves = VirtualReserves::new(base, quote).ok_or(MarketError::InvalidReserves)?;
        let price = reserves.price().ok_or(MarketError::InvalidReserves)?;

        let deviation_bps = math::deviation_bps(price, current);
        let max_bps = self.config.risk.max_rebalance_deviation_bps;
        if deviation_bps > max_bps {
            return Err(EngineError::RebalanceTooLarge { deviation_bps, max_bps });
        }

        self.commit_rebalance(market_id, reserves, ReserveChangeReason::AdminLiquidityAdded)?;
        Ok(price)
    }

    pub fn deactivate_market(&mut self, caller: AccountId, market_id: MarketId) -> Result<(), EngineError> {
        self.set_market_active(caller, market_id, false)
    }

    pub fn reactivate_market(&mut self, caller: AccountId, market_id: MarketId) -> Result<(), EngineError> {
        self.set_market_active(caller, market_id, true)
    }

    pub fn transfer_operator(&mut self, caller: AccountId, new_operator: AccountId) -> Result<(), EngineError> {
        self.require_operator(caller)?;
        let previous = self.operator;
        self.operator = new_operator;
        info!(?previous, new = ?new_operator, "operator transferred");
        self.emit_event(EventPayload::OperatorTransferred(OperatorTransferredEvent {
            previous,
            new: new_operator,
        }));
        Ok(())
    }

    fn set_market_active(&mut self, caller: AccountId, market_id: MarketId, is_active: bool) -> Result<(), EngineError> {
        self.require_operator(caller)?;
        let now = self.current_time;
        let market = self.markets.get_mut(market_id)?;
        if market.is_active == is_active {
            return Ok(());
        }
        market.is_active = is_active;
        market.last_updated = now;

        info!(?market_id, is_active, "market status changed");
        self.emit_event(EventPayload::MarketStatusChanged(MarketStatusChangedEvent { market_id, is_active }));
        Ok(())
    }

    fn commit_rebalance(
        &mut self,
        market_id: MarketId,
        reserves: VirtualReserves,
        reason: ReserveChangeReason,
    ) -> Result<(), EngineError> {
        let now = self.current_time;
        let market = self.markets.get_active_mut(market_id)?;
        market.reset_reserves(reserves, now);
        let vamm_price = market.vamm_price().ok_or(MarketError::InvalidReserves)?;
        let event = ReservesUpdatedEvent {
            market_id,
            virtual_base: market.virtual_base,
            virtual_quote: market.virtual_quote,
            k: market.k,
            vamm_price,
            total_long_oi: market.total_long_oi,
            total_short_oi: market.total_short_oi,
            reason,
        };

        info!(?market_id, ?reason, %vamm_price, "virtual reserves rebalanced");
        self.emit_event(EventPayload::ReservesUpdated(event));
        Ok(())
    }
}
