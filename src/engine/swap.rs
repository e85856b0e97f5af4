//! Direct pool swaps. Priced at the mark price and fully self-settling: the hook
//! takes the opposite side of every transfer, so nothing leaks from the pool.

use super::core::Engine;
use super::results::{EngineError, SwapExecution};
use crate::events::{EventPayload, SwapSettledEvent};
use crate::ledger::PositionLedger;
use crate::types::{BaseAmount, MarketId};
use crate::vamm::{quote_swap, settle, SwapDirection, SwapRequest};
use tracing::info;

impl<L: PositionLedger> Engine<L> {
    pub fn swap(&mut self, market_id: MarketId, request: SwapRequest) -> Result<SwapExecution, EngineError> {
        if request.amount.is_zero() {
            return Err(EngineError::ZeroSize);
        }

        let market = self.markets.get_active(market_id)?;
        let mark_price = self.breakdown_for(market)?.mark_price;
        let fee_pips = self.fee_for(market, request.direction.side());

        let quote = quote_swap(mark_price, &request, fee_pips);
        let base_leg = match request.direction {
            SwapDirection::QuoteForBase => quote.amount_out,
            SwapDirection::BaseForQuote => quote.amount_in,
        };
        let max = market.params.max_trade_size;
        if base_leg > max.raw() {
            return Err(EngineError::TradeTooLarge {
                size: BaseAmount::new(base_leg),
                max,
            });
        }
        let settlement = settle(request.direction, &quote)?;
        debug_assert!(settlement.pool_delta().is_zero());

        let now = self.current_time;
        let market = self.markets.get_active_mut(market_id)?;
        market.accrue_fee(quote.fee);
        market.last_updated = now;

        info!(
            ?market_id,
            direction = ?request.direction,
            kind = ?request.kind,
            %mark_price,
            fee = %quote.fee,
            "swap settled"
        );
        self.emit_event(EventPayload::SwapSettled(SwapSettledEvent {
            market_id,
            direction: request.direction,
            price: mark_price,
            amount_in: quote.amount_in,
            amount_out: quote.amount_out,
            fee: quote.fee,
            trader_delta: settlement.trader,
            hook_delta: settlement.hook,
        }));

        Ok(SwapExecution {
            market_id,
            quote,
            settlement,
            fee_pips,
        })
    }

    /// Virtual reserves cannot be funded.
    pub fn add_liquidity(&mut self, _market_id: MarketId) -> Result<(), EngineError> {
        Err(EngineError::LiquidityOperationNotAllowed)
    }

    pub fn remove_liquidity(&mut self, _market_id: MarketId) -> Result<(), EngineError> {
        Err(EngineError::LiquidityOperationNotAllowed)
    }
}
