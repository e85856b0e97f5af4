//! Position lifecycle: turns accepted intents into reserve moves and ledger calls.
//!
//! Every operation validates and prices first, then calls the ledger, then commits
//! reserves and open interest. Nothing is written to the market until the ledger has
//! accepted, so a rejected intent leaves no trace.

use super::core::Engine;
use super::results::{CloseResult, EngineError, IntentOutcome, MarginResult, OpenResult};
use crate::events::{
    EventPayload, MarginAdjustedEvent, PositionClosedEvent, PositionOpenedEvent, ReserveChangeReason,
    ReservesUpdatedEvent,
};
use crate::intent::{within_limit, TradeIntent};
use crate::ledger::{LedgerError, PositionLedger, PositionRecord};
use crate::market::MarketError;
use crate::math;
use crate::risk::{self, OpenRequest, RiskError};
use crate::types::{AccountId, BaseAmount, MarketId, PositionId, Price, QuoteAmount, Side, SignedSize};
use crate::vamm::ReserveFootprint;
use tracing::{info, warn};

impl<L: PositionLedger> Engine<L> {
    pub fn execute(&mut self, intent: TradeIntent) -> Result<IntentOutcome, EngineError> {
        match intent {
            TradeIntent::Open {
                trader,
                market_id,
                side,
                size,
                margin,
                price_limit,
            } => self
                .open_position(trader, market_id, side, size, margin, price_limit)
                .map(IntentOutcome::Opened),
            TradeIntent::Close {
                trader,
                market_id,
                position_id,
                price_limit,
            } => self
                .close_position(trader, market_id, position_id, price_limit)
                .map(IntentOutcome::Closed),
            TradeIntent::AddMargin {
                trader,
                position_id,
                amount,
            } => self
                .add_margin(trader, position_id, amount)
                .map(IntentOutcome::MarginAdjusted),
            TradeIntent::RemoveMargin {
                trader,
                position_id,
                amount,
            } => self
                .remove_margin(trader, position_id, amount)
                .map(IntentOutcome::MarginAdjusted),
        }
    }

    pub fn open_position(
        &mut self,
        trader: AccountId,
        market_id: MarketId,
        side: Side,
        size: BaseAmount,
        margin: QuoteAmount,
        price_limit: Option<Price>,
    ) -> Result<OpenResult, EngineError> {
        if size.is_zero() {
            return Err(EngineError::ZeroSize);
        }
        if margin.is_zero() {
            return Err(EngineError::ZeroMargin);
        }

        let market = self.markets.get_active(market_id)?;
        if size > market.params.max_trade_size {
            return Err(EngineError::TradeTooLarge {
                size,
                max: market.params.max_trade_size,
            });
        }

        let breakdown = self.breakdown_for(market)?;
        let mark_price = breakdown.mark_price;
        if !within_limit(side == Side::Long, mark_price, price_limit) {
            return Err(slippage(price_limit, mark_price));
        }

        let notional = math::notional(size, mark_price);
        if notional.is_zero() {
            return Err(EngineError::ZeroSize);
        }

        // band only applies to markets with a configured spot reference
        let spot_reference = market
            .spot_price_feed
            .as_ref()
            .and(breakdown.spot_price);
        risk::admit_open(
            &OpenRequest {
                side,
                notional,
                margin,
                current_oi: market.open_interest(side),
                vamm_price: breakdown.vamm_price,
                spot_reference,
            },
            &market.params,
            &self.config.risk,
        )?;

        let fee_pips = self.fee_for(market, side);
        let fee = math::fee_on(notional, fee_pips);
        let net_margin = match margin.checked_sub(fee) {
            Some(net) if !net.is_zero() => net,
            _ => {
                return Err(RiskError::InsufficientMargin {
                    provided: margin,
                    required: fee,
                }
                .into())
            }
        };

        let before = market.reserves();
        let reserves = before.after_open(side, size, notional)?;
        let signed_size = SignedSize::from_side(side, size).ok_or(EngineError::MathOverflow)?;

        let now = self.current_time;
        if !fee.is_zero() {
            self.ledger.collect_fee(trader, fee)?;
        }
        let position_id = match self
            .ledger
            .open_position_for(trader, market_id, signed_size, mark_price, net_margin, now)
        {
            Ok(id) => id,
            Err(e) => {
                if !fee.is_zero() {
                    if let Err(refund) = self.ledger.refund_fee(trader, fee) {
                        warn!(?trader, %fee, %refund, "fee refund failed after rejected open");
                    }
                }
                return Err(e.into());
            }
        };
        self.footprints.insert(
            position_id,
            ReserveFootprint {
                before,
                after: reserves,
            },
        );

        let market = self.markets.get_active_mut(market_id)?;
        market.apply_trade_reserves(reserves, now);
        market.add_open_interest(side, notional)?;
        market.accrue_fee(fee);
        let vamm_price_after = market.vamm_price().ok_or(MarketError::InvalidReserves)?;
        let reserves_event = reserves_event(market, vamm_price_after, ReserveChangeReason::PositionOpened);

        info!(
            ?market_id,
            ?position_id,
            ?trader,
            ?side,
            %size,
            %mark_price,
            %notional,
            %fee,
            "position opened"
        );
        self.emit_event(EventPayload::ReservesUpdated(reserves_event));
        self.emit_event(EventPayload::PositionOpened(PositionOpenedEvent {
            market_id,
            position_id,
            trader,
            size: signed_size,
            entry_price: mark_price,
            notional,
            margin: net_margin,
            fee,
            fee_pips,
        }));

        let funding = self.accrue_funding_if_due(market_id);

        Ok(OpenResult {
            position_id,
            market_id,
            side,
            size,
            entry_price: mark_price,
            notional,
            margin: net_margin,
            fee,
            fee_pips,
            vamm_price_after,
            funding,
        })
    }

    pub fn close_position(
        &mut self,
        trader: AccountId,
        market_id: MarketId,
        position_id: PositionId,
        price_limit: Option<Price>,
    ) -> Result<CloseResult, EngineError> {
        let record = self.owned_position(trader, position_id)?;
        if record.market_id != market_id {
            return Err(EngineError::PositionMarketMismatch {
                position_id,
                requested: market_id,
                actual: record.market_id,
            });
        }
        let side = record
            .size
            .side()
            .ok_or(LedgerError::EmptyPosition(position_id))?;

        let market = self.markets.get_active(market_id)?;
        let exit_price = self.breakdown_for(market)?.mark_price;
        // closing a short buys back, closing a long sells
        if !within_limit(side == Side::Short, exit_price, price_limit) {
            return Err(slippage(price_limit, exit_price));
        }

        // untouched since the open: restore exactly. otherwise reverse the traded leg
        let size = record.size.abs();
        let entry_notional = math::notional(size, record.entry_price);
        let current = market.reserves();
        let reserves = match self.footprints.get(&position_id).and_then(|fp| fp.undo(&current)) {
            Some(before) => before,
            None => current.after_close(side, size, entry_notional)?,
        };

        let closed = self.ledger.close_position(position_id, exit_price)?;
        self.footprints.remove(&position_id);

        let now = self.current_time;
        let market = self.markets.get_active_mut(market_id)?;
        market.apply_trade_reserves(reserves, now);
        market.reduce_open_interest(side, entry_notional);
        let vamm_price_after = market.vamm_price().ok_or(MarketError::InvalidReserves)?;
        let reserves_event = reserves_event(market, vamm_price_after, ReserveChangeReason::PositionClosed);

        info!(
            ?market_id,
            ?position_id,
            ?trader,
            size = %record.size,
            entry_price = %record.entry_price,
            %exit_price,
            realized_pnl = closed.realized_pnl,
            "position closed"
        );
        self.emit_event(EventPayload::ReservesUpdated(reserves_event));
        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            market_id,
            position_id,
            trader,
            size: record.size,
            entry_price: record.entry_price,
            exit_price,
            realized_pnl: closed.realized_pnl,
        }));

        let funding = self.accrue_funding_if_due(market_id);

        Ok(CloseResult {
            position_id,
            market_id,
            size: record.size,
            entry_price: record.entry_price,
            exit_price,
            realized_pnl: closed.realized_pnl,
            released: closed.released,
            vamm_price_after,
            funding,
        })
    }

    pub fn add_margin(
        &mut self,
        trader: AccountId,
        position_id: PositionId,
        amount: QuoteAmount,
    ) -> Result<MarginResult, EngineError> {
        if amount.is_zero() {
            return Err(EngineError::ZeroMargin);
        }
        let record = self.owned_position(trader, position_id)?;
        self.markets.get_active(record.market_id)?;

        let new_margin = self.ledger.add_margin(position_id, amount)?;
        let delta = math::u256_to_i128(amount.raw()).ok_or(EngineError::MathOverflow)?;
        Ok(self.margin_adjusted(record, delta, new_margin))
    }

    /// Refused if what is left would not pass the opening margin check at the current mark.
    pub fn remove_margin(
        &mut self,
        trader: AccountId,
        position_id: PositionId,
        amount: QuoteAmount,
    ) -> Result<MarginResult, EngineError> {
        if amount.is_zero() {
            return Err(EngineError::ZeroMargin);
        }
        let record = self.owned_position(trader, position_id)?;
        let market = self.markets.get_active(record.market_id)?;
        let mark_price = self.breakdown_for(market)?.mark_price;

        let remaining = record
            .margin
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientPositionMargin {
                position_id,
                margin: record.margin,
                requested: amount,
            })?;
        let notional = math::notional(record.size.abs(), mark_price);
        risk::check_margin(remaining, notional, &market.params)?;

        let new_margin = self.ledger.remove_margin(position_id, amount)?;
        let delta = math::u256_to_i128(amount.raw()).ok_or(EngineError::MathOverflow)?;
        Ok(self.margin_adjusted(record, -delta, new_margin))
    }

    fn owned_position(&self, trader: AccountId, position_id: PositionId) -> Result<PositionRecord, EngineError> {
        let record = self.ledger.get_position(position_id)?;
        if record.owner != trader {
            return Err(EngineError::NotPositionOwner {
                position_id,
                caller: trader,
            });
        }
        Ok(record)
    }

    fn margin_adjusted(&mut self, record: PositionRecord, delta: i128, new_margin: QuoteAmount) -> MarginResult {
        info!(
            market_id = ?record.market_id,
            position_id = ?record.id,
            delta,
            %new_margin,
            "margin adjusted"
        );
        self.emit_event(EventPayload::MarginAdjusted(MarginAdjustedEvent {
            market_id: record.market_id,
            position_id: record.id,
            trader: record.owner,
            delta,
            new_margin,
        }));
        MarginResult {
            position_id: record.id,
            market_id: record.market_id,
            new_margin,
        }
    }
}

fn slippage(limit: Option<Price>, price: Price) -> EngineError {
    EngineError::SlippageExceeded {
        limit: limit.unwrap_or(price),
        price,
    }
}

fn reserves_event(
    market: &crate::market::Market,
    vamm_price: Price,
    reason: ReserveChangeReason,
) -> ReservesUpdatedEvent {
    ReservesUpdatedEvent {
        market_id: market.id,
        virtual_base: market.virtual_base,
        virtual_quote: market.virtual_quote,
        k: market.k,
        vamm_price,
        total_long_oi: market.total_long_oi,
        total_short_oi: market.total_short_oi,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::engine::{Engine, EngineError, IntentOutcome, MarketSetup};
    use crate::events::EventPayload;
    use crate::intent::TradeIntent;
    use crate::ledger::{ClosedPosition, InMemoryLedger, LedgerError, PositionLedger, PositionRecord};
    use crate::market::{MarketError, MarketParams};
    use crate::types::SignedSize;
    use crate::vault::VaultError;
    use crate::risk::RiskError;
    use crate::types::{AccountId, BaseAmount, FeePips, MarketId, PositionId, Price, QuoteAmount, Side, Timestamp};
    use rust_decimal_macros::dec;

    const OPERATOR: AccountId = AccountId(1);
    const ALICE: AccountId = AccountId(10);
    const BOB: AccountId = AccountId(11);
    const ETH: MarketId = MarketId(1);

    fn usd(units: u64) -> QuoteAmount {
        QuoteAmount::from_whole(units)
    }

    fn eth(units: u64) -> BaseAmount {
        BaseAmount::from_whole(units)
    }

    fn engine_with(params: MarketParams) -> Engine {
        let mut engine = Engine::in_memory(EngineConfig::default()).unwrap();
        engine
            .initialize_market(OPERATOR, ETH, MarketSetup::new(eth(1000)).with_params(params))
            .unwrap();
        for trader in [ALICE, BOB] {
            engine
                .ledger_mut()
                .deposit(trader, usd(100_000), Timestamp::from_millis(0))
                .unwrap();
        }
        engine
    }

    fn engine() -> Engine {
        engine_with(MarketParams::default())
    }

    #[test]
    fn open_long_moves_quote_then_base() {
        let mut engine = engine();
        let before = engine.get_market_state(ETH).unwrap();

        let result = engine
            .open_position(ALICE, ETH, Side::Long, eth(1), usd(200), None)
            .unwrap();
        assert_eq!(result.entry_price, Price::from_whole(2000));
        assert_eq!(result.notional, usd(2000));
        assert_eq!(result.fee, usd(6));
        assert_eq!(result.margin, usd(194));
        assert!(result.vamm_price_after > Price::from_whole(2000));

        let after = engine.get_market_state(ETH).unwrap();
        assert_eq!(after.virtual_quote, before.virtual_quote.checked_add(usd(2000)).unwrap());
        assert_eq!(after.virtual_base.raw(), after.k / after.virtual_quote.raw());
        assert_eq!(after.total_long_oi, usd(2000));
        assert_eq!(after.fees_accrued, usd(6));

        let vault = engine.ledger().vault().account(ALICE).unwrap();
        assert_eq!(vault.locked, usd(194));
        assert_eq!(vault.free, usd(99_800));
    }

    #[test]
    fn open_short_moves_base_then_quote() {
        let mut engine = engine();
        let before = engine.get_market_state(ETH).unwrap();

        let result = engine
            .open_position(BOB, ETH, Side::Short, eth(2), usd(400), None)
            .unwrap();
        assert!(result.vamm_price_after < Price::from_whole(2000));

        let after = engine.get_market_state(ETH).unwrap();
        assert_eq!(after.virtual_base, before.virtual_base.checked_add(eth(2)).unwrap());
        assert_eq!(after.virtual_quote.raw(), after.k / after.virtual_base.raw());
        assert_eq!(after.total_short_oi, usd(4000));
    }

    #[test]
    fn close_restores_reserves_and_oi() {
        let mut engine = engine();
        let before = engine.get_market_state(ETH).unwrap();

        for (trader, side) in [(ALICE, Side::Long), (BOB, Side::Short)] {
            let opened = engine.open_position(trader, ETH, side, eth(3), usd(600), None).unwrap();
            let closed = engine.close_position(trader, ETH, opened.position_id, None).unwrap();
            assert_eq!(closed.size.side(), Some(side));

            let after = engine.get_market_state(ETH).unwrap();
            assert_eq!(after.reserves().product(), before.reserves().product());
            assert_eq!(after.virtual_base, before.virtual_base);
            assert_eq!(after.virtual_quote, before.virtual_quote);
            assert_eq!(after.total_long_oi, QuoteAmount::zero());
            assert_eq!(after.total_short_oi, QuoteAmount::zero());
        }
    }

    #[test]
    fn close_realizes_pnl_against_mark() {
        let mut engine = engine();
        let opened = engine.open_position(ALICE, ETH, Side::Long, eth(1), usd(200), None).unwrap();
        // someone else pushes the price up
        engine.open_position(BOB, ETH, Side::Long, eth(50), usd(10_000), None).unwrap();

        let closed = engine.close_position(ALICE, ETH, opened.position_id, None).unwrap();
        assert!(closed.exit_price > closed.entry_price);
        assert!(closed.realized_pnl > 0);
        assert!(closed.released > usd(194));
    }

    #[test]
    fn margin_floor() {
        let mut engine = engine();
        // $50 notional at 20x: $2.50 by leverage, $10 by floor
        let size = BaseAmount::from_decimal(dec!(0.025)).unwrap();
        let result = engine.open_position(ALICE, ETH, Side::Long, size, usd(5), None);
        assert_eq!(
            result.unwrap_err(),
            EngineError::Risk(RiskError::InsufficientMargin {
                provided: usd(5),
                required: usd(10),
            })
        );
        assert!(engine.open_position(ALICE, ETH, Side::Long, size, usd(10), None).is_ok());
    }

    #[test]
    fn open_interest_cap_leaves_state_untouched() {
        let mut params = MarketParams::default();
        params.max_oi_cap = usd(5_000);
        let mut engine = engine_with(params);

        engine.open_position(ALICE, ETH, Side::Long, eth(2), usd(400), None).unwrap();
        let before = engine.get_market_state(ETH).unwrap();
        let events_before = engine.events().len();

        let result = engine.open_position(BOB, ETH, Side::Long, eth(1), usd(400), None);
        assert!(matches!(
            result,
            Err(EngineError::Risk(RiskError::OpenInterestCapExceeded { side: Side::Long, .. }))
        ));
        assert_eq!(engine.get_market_state(ETH).unwrap(), before);
        assert_eq!(engine.events().len(), events_before);
        assert_eq!(engine.ledger().vault().account(BOB).unwrap().free, usd(100_000));

        // the other side has its own cap
        assert!(engine.open_position(BOB, ETH, Side::Short, eth(1), usd(400), None).is_ok());
    }

    #[test]
    fn input_validation() {
        let mut engine = engine();
        assert_eq!(
            engine.open_position(ALICE, ETH, Side::Long, BaseAmount::zero(), usd(10), None),
            Err(EngineError::ZeroSize)
        );
        assert_eq!(
            engine.open_position(ALICE, ETH, Side::Long, eth(1), QuoteAmount::zero(), None),
            Err(EngineError::ZeroMargin)
        );
        assert!(matches!(
            engine.open_position(ALICE, ETH, Side::Long, eth(10_001), usd(10), None),
            Err(EngineError::TradeTooLarge { .. })
        ));
        assert_eq!(
            engine.open_position(ALICE, MarketId(9), Side::Long, eth(1), usd(200), None),
            Err(EngineError::Market(MarketError::NotFound(MarketId(9))))
        );
    }

    #[test]
    fn slippage_limit() {
        let mut engine = engine();
        let result = engine.open_position(ALICE, ETH, Side::Long, eth(1), usd(200), Some(Price::from_whole(1999)));
        assert!(matches!(result, Err(EngineError::SlippageExceeded { .. })));

        let result = engine.open_position(ALICE, ETH, Side::Short, eth(1), usd(200), Some(Price::from_whole(2001)));
        assert!(matches!(result, Err(EngineError::SlippageExceeded { .. })));

        assert!(engine
            .open_position(ALICE, ETH, Side::Short, eth(1), usd(200), Some(Price::from_whole(1999)))
            .is_ok());
    }

    #[test]
    fn inactive_market_rejects_trades() {
        let mut engine = engine();
        let opened = engine.open_position(ALICE, ETH, Side::Long, eth(1), usd(200), None).unwrap();
        engine.deactivate_market(OPERATOR, ETH).unwrap();

        assert_eq!(
            engine.open_position(BOB, ETH, Side::Long, eth(1), usd(200), None),
            Err(EngineError::Market(MarketError::Inactive(ETH)))
        );
        assert!(engine.close_position(ALICE, ETH, opened.position_id, None).is_err());

        engine.reactivate_market(OPERATOR, ETH).unwrap();
        assert!(engine.close_position(ALICE, ETH, opened.position_id, None).is_ok());
    }

    #[test]
    fn only_owner_can_touch_position() {
        let mut engine = engine();
        let opened = engine.open_position(ALICE, ETH, Side::Long, eth(1), usd(200), None).unwrap();

        assert_eq!(
            engine.close_position(BOB, ETH, opened.position_id, None),
            Err(EngineError::NotPositionOwner {
                position_id: opened.position_id,
                caller: BOB,
            })
        );
        assert!(matches!(
            engine.add_margin(BOB, opened.position_id, usd(1)),
            Err(EngineError::NotPositionOwner { .. })
        ));
        assert!(matches!(
            engine.close_position(ALICE, MarketId(2), opened.position_id, None),
            Err(EngineError::PositionMarketMismatch { .. })
        ));
    }

    #[test]
    fn margin_pass_through() {
        let mut engine = engine();
        let opened = engine.open_position(ALICE, ETH, Side::Long, eth(1), usd(200), None).unwrap();
        let reserves = engine.get_market_state(ETH).unwrap().reserves();

        let added = engine.add_margin(ALICE, opened.position_id, usd(50)).unwrap();
        assert_eq!(added.new_margin, usd(244));
        let removed = engine.remove_margin(ALICE, opened.position_id, usd(100)).unwrap();
        assert_eq!(removed.new_margin, usd(144));

        assert_eq!(engine.get_market_state(ETH).unwrap().reserves(), reserves);
        assert_eq!(engine.ledger().get_position(opened.position_id).unwrap().margin, usd(144));
        assert!(matches!(
            engine.events().last().map(|e| &e.payload),
            Some(EventPayload::MarginAdjusted(_))
        ));
    }

    #[test]
    fn remove_margin_keeps_requirement() {
        let mut engine = engine();
        // 1 ETH at ~$2000 needs $100
        let opened = engine.open_position(ALICE, ETH, Side::Long, eth(1), usd(200), None).unwrap();
        let result = engine.remove_margin(ALICE, opened.position_id, usd(150));
        assert!(matches!(
            result,
            Err(EngineError::Risk(RiskError::InsufficientMargin { .. }))
        ));
        assert_eq!(engine.ledger().get_position(opened.position_id).unwrap().margin, usd(194));
    }

    #[test]
    fn fee_larger_than_margin_rejected() {
        let mut params = MarketParams::default();
        params.base_fee_pips = FeePips(100_000); // 10%
        let mut engine = engine_with(params);
        // $2000 notional, $200 fee, $150 margin passes the 20x check but not the fee
        let result = engine.open_position(ALICE, ETH, Side::Long, eth(1), usd(150), None);
        assert!(matches!(
            result,
            Err(EngineError::Risk(RiskError::InsufficientMargin { .. }))
        ));
    }

    #[test]
    fn ledger_failure_refunds_fee() {
        let mut engine = engine();
        let poor = AccountId(99);
        engine
            .ledger_mut()
            .deposit(poor, usd(150), Timestamp::from_millis(0))
            .unwrap();
        // posting more margin than the account holds
        let result = engine.open_position(poor, ETH, Side::Long, eth(1), usd(200), None);
        assert!(matches!(result, Err(EngineError::Ledger(_))));
        assert_eq!(engine.ledger().vault().account(poor).unwrap().free, usd(150));
        assert_eq!(engine.get_market_state(ETH).unwrap().total_long_oi, QuoteAmount::zero());
    }

    /// Delegates to the in-memory ledger but can never hand a fee back.
    struct NoRefundLedger(InMemoryLedger);

    impl PositionLedger for NoRefundLedger {
        fn open_position_for(
            &mut self,
            owner: AccountId,
            market_id: MarketId,
            size: SignedSize,
            entry_price: Price,
            margin: QuoteAmount,
            timestamp: Timestamp,
        ) -> Result<PositionId, LedgerError> {
            self.0.open_position_for(owner, market_id, size, entry_price, margin, timestamp)
        }

        fn get_position(&self, position_id: PositionId) -> Result<PositionRecord, LedgerError> {
            self.0.get_position(position_id)
        }

        fn close_position(&mut self, position_id: PositionId, exit_price: Price) -> Result<ClosedPosition, LedgerError> {
            self.0.close_position(position_id, exit_price)
        }

        fn add_margin(&mut self, position_id: PositionId, amount: QuoteAmount) -> Result<QuoteAmount, LedgerError> {
            self.0.add_margin(position_id, amount)
        }

        fn remove_margin(&mut self, position_id: PositionId, amount: QuoteAmount) -> Result<QuoteAmount, LedgerError> {
            self.0.remove_margin(position_id, amount)
        }

        fn collect_fee(&mut self, owner: AccountId, fee: QuoteAmount) -> Result<(), LedgerError> {
            self.0.collect_fee(owner, fee)
        }

        fn refund_fee(&mut self, _owner: AccountId, _fee: QuoteAmount) -> Result<(), LedgerError> {
            Err(LedgerError::Overflow)
        }
    }

    #[test]
    fn failed_refund_keeps_the_open_error() {
        let mut engine = Engine::new(EngineConfig::default(), NoRefundLedger(InMemoryLedger::new())).unwrap();
        engine
            .initialize_market(OPERATOR, ETH, MarketSetup::new(eth(1000)))
            .unwrap();
        let poor = AccountId(99);
        engine
            .ledger_mut()
            .0
            .deposit(poor, usd(150), Timestamp::from_millis(0))
            .unwrap();
        let before = engine.get_market_state(ETH).unwrap();

        let result = engine.open_position(poor, ETH, Side::Long, eth(1), usd(200), None);
        assert!(matches!(
            result,
            Err(EngineError::Ledger(LedgerError::Vault(VaultError::InsufficientBalance { .. })))
        ));
        assert_eq!(engine.get_market_state(ETH).unwrap(), before);
    }

    #[test]
    fn interleaved_sides_round_trip_exactly() {
        let mut engine = engine();
        // bob shorts 7, then alice opens and closes 3 long on top of it
        engine.open_position(BOB, ETH, Side::Short, eth(7), usd(1_400), None).unwrap();
        let before = engine.get_market_state(ETH).unwrap();

        let opened = engine.open_position(ALICE, ETH, Side::Long, eth(3), usd(600), None).unwrap();
        engine.close_position(ALICE, ETH, opened.position_id, None).unwrap();

        let after = engine.get_market_state(ETH).unwrap();
        assert_eq!(after.reserves(), before.reserves());
        assert_eq!(after.reserves().product(), before.reserves().product());
        assert_eq!(after.total_long_oi, QuoteAmount::zero());
        assert_eq!(after.total_short_oi, before.total_short_oi);
    }

    #[test]
    fn long_stays_closable_after_larger_opposite_short() {
        let mut engine = engine();
        for trader in [ALICE, BOB] {
            engine
                .ledger_mut()
                .deposit(trader, usd(10_000_000), Timestamp::from_millis(0))
                .unwrap();
        }
        let long = engine
            .open_position(ALICE, ETH, Side::Long, eth(1000), usd(1_000_000), None)
            .unwrap();
        engine
            .open_position(BOB, ETH, Side::Short, eth(1200), usd(1_000_000), None)
            .unwrap();

        let closed = engine.close_position(ALICE, ETH, long.position_id, None).unwrap();
        assert!(closed.realized_pnl < 0);

        let market = engine.get_market_state(ETH).unwrap();
        assert_eq!(market.total_long_oi, QuoteAmount::zero());
        assert!(market.reserves().product() <= market.k);
        assert!(engine.ledger().get_position(long.position_id).is_err());
    }

    #[test]
    fn margin_changes_need_an_active_market() {
        let mut engine = engine();
        let opened = engine.open_position(ALICE, ETH, Side::Long, eth(1), usd(200), None).unwrap();
        engine.deactivate_market(OPERATOR, ETH).unwrap();

        assert_eq!(
            engine.add_margin(ALICE, opened.position_id, usd(50)),
            Err(EngineError::Market(MarketError::Inactive(ETH)))
        );
        assert_eq!(
            engine.remove_margin(ALICE, opened.position_id, usd(50)),
            Err(EngineError::Market(MarketError::Inactive(ETH)))
        );
        assert_eq!(engine.ledger().get_position(opened.position_id).unwrap().margin, usd(194));
    }

    #[test]
    fn execute_dispatches_intents() {
        let mut engine = engine();
        let outcome = engine
            .execute(TradeIntent::Open {
                trader: ALICE,
                market_id: ETH,
                side: Side::Short,
                size: eth(1),
                margin: usd(200),
                price_limit: None,
            })
            .unwrap();
        let IntentOutcome::Opened(opened) = outcome else {
            panic!("expected an open");
        };

        let outcome = engine
            .execute(TradeIntent::AddMargin {
                trader: ALICE,
                position_id: opened.position_id,
                amount: usd(10),
            })
            .unwrap();
        assert!(matches!(outcome, IntentOutcome::MarginAdjusted(_)));

        let outcome = engine
            .execute(TradeIntent::Close {
                trader: ALICE,
                market_id: ETH,
                position_id: opened.position_id,
                price_limit: None,
            })
            .unwrap();
        assert!(matches!(outcome, IntentOutcome::Closed(_)));
        assert!(engine.ledger().get_position(PositionId(1)).is_err());
    }

    #[test]
    fn lifecycle_events() {
        let mut engine = engine();
        let opened = engine.open_position(ALICE, ETH, Side::Long, eth(1), usd(200), None).unwrap();
        engine.close_position(ALICE, ETH, opened.position_id, None).unwrap();

        let kinds: Vec<&str> = engine
            .events()
            .iter()
            .map(|e| match e.payload {
                EventPayload::MarketInitialized(_) => "init",
                EventPayload::ReservesUpdated(_) => "reserves",
                EventPayload::PositionOpened(_) => "opened",
                EventPayload::PositionClosed(_) => "closed",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["init", "reserves", "opened", "reserves", "closed"]);
    }
}
