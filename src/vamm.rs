//! Virtual AMM: constant-product reserves and self-settling swap pricing.
//!
//! Reserves are never backed by deposits. They exist only to produce price impact:
//! opening and closing positions move one reserve by the traded amount and recompute
//! the other from the stored invariant `k`. Trading never rewrites `k`; only an
//! administrative reset does (see `VirtualReserves::new`).
//!
//! Swaps are priced at the mark price, not along the curve. The settlement a swap
//! produces is matched by an equal and opposite hook delta, so the pool's own
//! balances never change.

use crate::math;
use crate::types::{BaseAmount, FeePips, Price, QuoteAmount, Side};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Virtual reserves plus the invariant they were last reset to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualReserves {
    pub base: BaseAmount,
    pub quote: QuoteAmount,
    pub k: U256,
}

/// Reserves on either side of one opening trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveFootprint {
    pub before: VirtualReserves,
    pub after: VirtualReserves,
}

impl ReserveFootprint {
    /// The pre-open reserves, if nothing has touched the curve since the open.
    pub fn undo(&self, current: &VirtualReserves) -> Option<VirtualReserves> {
        (*current == self.after).then_some(self.before)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReserveError {
    #[error("Reserve underflow: cannot remove {requested} from {available}")]
    Underflow { requested: U256, available: U256 },

    #[error("Trade would drain a virtual reserve to zero")]
    Depleted,

    #[error("Reserve arithmetic overflow")]
    Overflow,
}

impl VirtualReserves {
    /// Fresh reserves with `k = base * quote`. None if either side is zero.
    pub fn new(base: BaseAmount, quote: QuoteAmount) -> Option<Self> {
        if base.is_zero() || quote.is_zero() {
            return None;
        }
        Some(Self {
            base,
            quote,
            k: math::invariant(base, quote),
        })
    }

    pub fn price(&self) -> Option<Price> {
        math::reserve_price(self.base, self.quote)
    }

    /// Current `base * quote`. At or below `k` after any trade.
    pub fn product(&self) -> U256 {
        math::invariant(self.base, self.quote)
    }

    // long: quote flows in, base recomputed from k
    pub fn after_open_long(&self, quote_in: QuoteAmount) -> Result<Self, ReserveError> {
        let quote = self.quote.checked_add(quote_in).ok_or(ReserveError::Overflow)?;
        self.with_quote(quote)
    }

    // short: base flows in, quote recomputed from k
    pub fn after_open_short(&self, base_in: BaseAmount) -> Result<Self, ReserveError> {
        let base = self.base.checked_add(base_in).ok_or(ReserveError::Overflow)?;
        self.with_base(base)
    }

    pub fn after_close_long(&self, quote_out: QuoteAmount) -> Result<Self, ReserveError> {
        let quote = self
            .quote
            .checked_sub(quote_out)
            .ok_or(ReserveError::Underflow {
                requested: quote_out.raw(),
                available: self.quote.raw(),
            })?;
        self.with_quote(quote)
    }

    pub fn after_close_short(&self, base_out: BaseAmount) -> Result<Self, ReserveError> {
        let base = self
            .base
            .checked_sub(base_out)
            .ok_or(ReserveError::Underflow {
                requested: base_out.raw(),
                available: self.base.raw(),
            })?;
        self.with_base(base)
    }

    /// Reserves after opening `size` on `side` with quote-equivalent `notional`.
    pub fn after_open(&self, side: Side, size: BaseAmount, notional: QuoteAmount) -> Result<Self, ReserveError> {
        match side {
            Side::Long => self.after_open_long(notional),
            Side::Short => self.after_open_short(size),
        }
    }

    /// Inverse of `after_open` for the same size and notional. When later trades have
    /// shrunk the traded reserve below what the open put in, the position is unwound by
    /// trading the other way instead, which only ever grows a reserve.
    pub fn after_close(&self, side: Side, size: BaseAmount, notional: QuoteAmount) -> Result<Self, ReserveError> {
        let reversed = match side {
            Side::Long => self.after_close_long(notional),
            Side::Short => self.after_close_short(size),
        };
        match reversed {
            Err(ReserveError::Underflow { .. }) | Err(ReserveError::Depleted) => {
                self.after_open(side.opposite(), size, notional)
            }
            other => other,
        }
    }

    fn with_quote(&self, quote: QuoteAmount) -> Result<Self, ReserveError> {
        if quote.is_zero() {
            return Err(ReserveError::Depleted);
        }
        let base = BaseAmount::new(self.k / quote.raw());
        if base.is_zero() {
            return Err(ReserveError::Depleted);
        }
        Ok(Self { base, quote, k: self.k })
    }

    fn with_base(&self, base: BaseAmount) -> Result<Self, ReserveError> {
        if base.is_zero() {
            return Err(ReserveError::Depleted);
        }
        let quote = QuoteAmount::new(self.k / base.raw());
        if quote.is_zero() {
            return Err(ReserveError::Depleted);
        }
        Ok(Self { base, quote, k: self.k })
    }
}

/// Which asset the trader sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    /// Pay quote, receive base. Economically a long.
    QuoteForBase,
    /// Pay base, receive quote. Economically a short.
    BaseForQuote,
}

impl SwapDirection {
    pub fn side(&self) -> Side {
        match self {
            SwapDirection::QuoteForBase => Side::Long,
            SwapDirection::BaseForQuote => Side::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapKind {
    /// `amount` is what the trader sends.
    ExactInput,
    /// `amount` is what the trader wants back.
    ExactOutput,
}

/// A swap against the vAMM. `amount` is raw units of the specified leg's asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub direction: SwapDirection,
    pub kind: SwapKind,
    pub amount: U256,
}

/// Amounts for both legs. Fees are always quote-denominated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub amount_in: U256,
    pub amount_out: U256,
    pub notional: QuoteAmount,
    pub fee: QuoteAmount,
    pub price: Price,
}

// 4.1: price both legs at `price`. rounding always favours the pool.
pub fn quote_swap(price: Price, request: &SwapRequest, fee: FeePips) -> SwapQuote {
    match (request.direction, request.kind) {
        (SwapDirection::QuoteForBase, SwapKind::ExactInput) => {
            let paid = QuoteAmount::new(request.amount);
            let fee_amount = math::fee_on(paid, fee).min(paid);
            let notional = paid.saturating_sub(fee_amount);
            let base_out = math::base_for_quote(notional, price);
            SwapQuote {
                amount_in: paid.raw(),
                amount_out: base_out.raw(),
                notional,
                fee: fee_amount,
                price,
            }
        }
        (SwapDirection::QuoteForBase, SwapKind::ExactOutput) => {
            let base_out = BaseAmount::new(request.amount);
            let notional = math::notional_up(base_out, price);
            let fee_amount = math::fee_on(notional, fee);
            let paid = notional.checked_add(fee_amount).unwrap_or(QuoteAmount::new(U256::MAX));
            SwapQuote {
                amount_in: paid.raw(),
                amount_out: base_out.raw(),
                notional,
                fee: fee_amount,
                price,
            }
        }
        (SwapDirection::BaseForQuote, SwapKind::ExactInput) => {
            let base_in = BaseAmount::new(request.amount);
            let notional = math::notional(base_in, price);
            let fee_amount = math::fee_on(notional, fee).min(notional);
            let received = notional.saturating_sub(fee_amount);
            SwapQuote {
                amount_in: base_in.raw(),
                amount_out: received.raw(),
                notional,
                fee: fee_amount,
                price,
            }
        }
        (SwapDirection::BaseForQuote, SwapKind::ExactOutput) => {
            let received = QuoteAmount::new(request.amount);
            let notional = math::gross_up_for_fee(received, fee);
            let fee_amount = notional.saturating_sub(received);
            let base_in = math::base_for_quote_up(notional, price);
            SwapQuote {
                amount_in: base_in.raw(),
                amount_out: received.raw(),
                notional,
                fee: fee_amount,
                price,
            }
        }
    }
}

/// Signed balance change per asset. Negative = owed by the party, positive = owed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub base: i128,
    pub quote: i128,
}

impl BalanceDelta {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn negate(&self) -> Self {
        Self {
            base: -self.base,
            quote: -self.quote,
        }
    }

    pub fn plus(&self, other: &BalanceDelta) -> Self {
        Self {
            base: self.base + other.base,
            quote: self.quote + other.quote,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.base == 0 && self.quote == 0
    }
}

/// The transfers a swap settles. `hook` always cancels `trader`, so `pool_delta()` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSettlement {
    pub trader: BalanceDelta,
    pub hook: BalanceDelta,
}

impl SwapSettlement {
    pub fn pool_delta(&self) -> BalanceDelta {
        self.trader.plus(&self.hook)
    }
}

pub fn settle(direction: SwapDirection, quote: &SwapQuote) -> Result<SwapSettlement, ReserveError> {
    let amount_in = math::u256_to_i128(quote.amount_in).ok_or(ReserveError::Overflow)?;
    let amount_out = math::u256_to_i128(quote.amount_out).ok_or(ReserveError::Overflow)?;

    let trader = match direction {
        SwapDirection::QuoteForBase => BalanceDelta {
            base: amount_out,
            quote: -amount_in,
        },
        SwapDirection::BaseForQuote => BalanceDelta {
            base: -amount_in,
            quote: amount_out,
        },
    };

    Ok(SwapSettlement {
        trader,
        hook: trader.negate(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserves() -> VirtualReserves {
        // 1000 ETH / 2,000,000 USDC = $2000
        VirtualReserves::new(BaseAmount::from_whole(1000), QuoteAmount::from_whole(2_000_000)).unwrap()
    }

    #[test]
    fn new_sets_invariant() {
        let r = reserves();
        assert_eq!(r.k, r.product());
        assert_eq!(r.price(), Some(Price::from_whole(2000)));
        assert!(VirtualReserves::new(BaseAmount::zero(), QuoteAmount::from_whole(1)).is_none());
    }

    #[test]
    fn open_long_raises_price() {
        let r = reserves();
        let after = r.after_open_long(QuoteAmount::from_whole(20_000)).unwrap();
        assert_eq!(after.k, r.k);
        assert!(after.base < r.base);
        assert!(after.price().unwrap() > r.price().unwrap());
        assert!(after.product() <= after.k);
    }

    #[test]
    fn open_short_lowers_price() {
        let r = reserves();
        let after = r.after_open_short(BaseAmount::from_whole(10)).unwrap();
        assert_eq!(after.k, r.k);
        assert!(after.quote < r.quote);
        assert!(after.price().unwrap() < r.price().unwrap());
    }

    #[test]
    fn close_is_exact_inverse_of_open() {
        let r = reserves();
        let size = BaseAmount::from_whole(3);
        let notional = QuoteAmount::from_whole(6_000);

        for side in [Side::Long, Side::Short] {
            let opened = r.after_open(side, size, notional).unwrap();
            let closed = opened.after_close(side, size, notional).unwrap();
            assert_eq!(closed, r);
            assert_eq!(closed.product(), r.product());
        }
    }

    #[test]
    fn close_larger_than_reserve_underflows() {
        let r = reserves();
        let result = r.after_close_long(QuoteAmount::from_whole(3_000_000));
        assert!(matches!(result, Err(ReserveError::Underflow { .. })));

        let drained = r.after_close_short(BaseAmount::from_whole(1000));
        assert_eq!(drained, Err(ReserveError::Depleted));
    }

    #[test]
    fn close_unwinds_on_curve_when_traded_reserve_is_short() {
        let r = reserves();
        // long put $3M of quote in, but only $2M is left on the curve
        let closed = r
            .after_close(Side::Long, BaseAmount::from_whole(600), QuoteAmount::from_whole(3_000_000))
            .unwrap();
        assert_eq!(closed.base, BaseAmount::from_whole(1600));
        assert!(closed.product() <= closed.k);
        assert!(closed.price().unwrap() < r.price().unwrap());

        let closed = r
            .after_close(Side::Short, BaseAmount::from_whole(1000), QuoteAmount::from_whole(2_000_000))
            .unwrap();
        assert_eq!(closed.quote, QuoteAmount::from_whole(4_000_000));
        assert!(closed.price().unwrap() > r.price().unwrap());
    }

    #[test]
    fn footprint_undoes_only_untouched_curve() {
        let r = reserves();
        let after = r.after_open_short(BaseAmount::from_whole(7)).unwrap();
        let footprint = ReserveFootprint { before: r, after };
        assert_eq!(footprint.undo(&after), Some(r));

        let moved = after.after_open_long(QuoteAmount::from_whole(100)).unwrap();
        assert_eq!(footprint.undo(&moved), None);
    }

    #[test]
    fn exact_input_buy() {
        let quote = quote_swap(
            Price::from_whole(2000),
            &SwapRequest {
                direction: SwapDirection::QuoteForBase,
                kind: SwapKind::ExactInput,
                amount: QuoteAmount::from_whole(2006).raw(),
            },
            FeePips(3000),
        );
        // fee = ceil(2006 * 0.003) = 6.018
        assert_eq!(quote.fee, QuoteAmount::new(U256::from(6_018_000u64)));
        assert_eq!(quote.amount_in, QuoteAmount::from_whole(2006).raw());
        assert!(quote.amount_out < BaseAmount::from_whole(1).raw());
    }

    #[test]
    fn exact_output_buy_charges_fee_on_top() {
        let quote = quote_swap(
            Price::from_whole(2000),
            &SwapRequest {
                direction: SwapDirection::QuoteForBase,
                kind: SwapKind::ExactOutput,
                amount: BaseAmount::from_whole(1).raw(),
            },
            FeePips(3000),
        );
        assert_eq!(quote.notional, QuoteAmount::from_whole(2000));
        assert_eq!(quote.fee, QuoteAmount::from_whole(6));
        assert_eq!(quote.amount_in, QuoteAmount::from_whole(2006).raw());
    }

    #[test]
    fn exact_input_sell() {
        let quote = quote_swap(
            Price::from_whole(2000),
            &SwapRequest {
                direction: SwapDirection::BaseForQuote,
                kind: SwapKind::ExactInput,
                amount: BaseAmount::from_whole(1).raw(),
            },
            FeePips(3000),
        );
        assert_eq!(quote.amount_out, QuoteAmount::from_whole(1994).raw());
        assert_eq!(quote.fee, QuoteAmount::from_whole(6));
    }

    #[test]
    fn exact_output_sell() {
        let quote = quote_swap(
            Price::from_whole(2000),
            &SwapRequest {
                direction: SwapDirection::BaseForQuote,
                kind: SwapKind::ExactOutput,
                amount: QuoteAmount::from_whole(997).raw(),
            },
            FeePips(3000),
        );
        assert_eq!(quote.notional, QuoteAmount::from_whole(1000));
        assert_eq!(quote.fee, QuoteAmount::from_whole(3));
        assert_eq!(quote.amount_in, BaseAmount::from_decimal(rust_decimal_macros::dec!(0.5)).unwrap().raw());
    }

    #[test]
    fn settlement_nets_to_zero() {
        let quote = quote_swap(
            Price::from_whole(2000),
            &SwapRequest {
                direction: SwapDirection::BaseForQuote,
                kind: SwapKind::ExactInput,
                amount: BaseAmount::from_whole(2).raw(),
            },
            FeePips(0),
        );
        let settlement = settle(SwapDirection::BaseForQuote, &quote).unwrap();
        assert!(settlement.trader.base < 0);
        assert!(settlement.trader.quote > 0);
        assert!(settlement.pool_delta().is_zero());
    }
}
