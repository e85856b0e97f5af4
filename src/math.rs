// 2.0: fixed-point price math. the only place scale factors appear.
// base = 18 decimals, quote = 6 decimals, price = 18 decimals (quote per base).
// every division truncates toward zero unless the fn name ends in _up.
// products go through a 512-bit intermediate so a * b / c never overflows mid-way.

use crate::types::{BaseAmount, FeePips, Price, QuoteAmount, SignedSize};
use primitive_types::{U256, U512};
use rust_decimal::Decimal;

pub const BASE_DECIMALS: u32 = 18;
pub const QUOTE_DECIMALS: u32 = 6;
pub const PRICE_DECIMALS: u32 = 18;

pub const BPS_DENOMINATOR: u32 = 10_000;
pub const PIPS_DENOMINATOR: u32 = 1_000_000;

// 1e18 as a signed value, for rates and indices
pub const PRECISION_I128: i128 = 1_000_000_000_000_000_000;

/// 1e18, the price unit.
pub fn precision() -> U256 {
    U256::exp10(PRICE_DECIMALS as usize)
}

/// 1e12, bridges an 18-decimal quantity and a 6-decimal quantity.
pub fn decimal_bridge() -> U256 {
    U256::exp10((BASE_DECIMALS - QUOTE_DECIMALS) as usize)
}

/// 1e30 = 1e12 * 1e18. turns base * price into quote units in one division.
pub fn composite_scale() -> U256 {
    U256::exp10((BASE_DECIMALS - QUOTE_DECIMALS + PRICE_DECIMALS) as usize)
}

// 2.1: wide multiply-then-divide. saturates at U256::MAX if the quotient itself overflows.
// divisor must be non-zero; every caller passes a constant, a Price, or a live reserve.
pub fn mul_div(a: U256, b: U256, divisor: U256) -> U256 {
    debug_assert!(!divisor.is_zero());
    let quotient = a.full_mul(b) / U512::from(divisor);
    U256::try_from(quotient).unwrap_or(U256::MAX)
}

pub fn mul_div_up(a: U256, b: U256, divisor: U256) -> U256 {
    debug_assert!(!divisor.is_zero());
    let product = a.full_mul(b);
    let wide_divisor = U512::from(divisor);
    let mut quotient = product / wide_divisor;
    if !(product % wide_divisor).is_zero() {
        quotient += U512::one();
    }
    U256::try_from(quotient).unwrap_or(U256::MAX)
}

// 2.2: 18 <-> 6 decimal bridge
pub fn to_quote_decimals(value_18: U256) -> QuoteAmount {
    QuoteAmount::new(value_18 / decimal_bridge())
}

pub fn from_quote_decimals(quote: QuoteAmount) -> U256 {
    quote.raw().saturating_mul(decimal_bridge())
}

// 2.3: notional = size * price, in quote units. size * price / 1e30
pub fn notional(size: BaseAmount, price: Price) -> QuoteAmount {
    QuoteAmount::new(mul_div(size.raw(), price.raw(), composite_scale()))
}

pub fn notional_up(size: BaseAmount, price: Price) -> QuoteAmount {
    QuoteAmount::new(mul_div_up(size.raw(), price.raw(), composite_scale()))
}

// inverse of notional: quote * 1e30 / price
pub fn base_for_quote(quote: QuoteAmount, price: Price) -> BaseAmount {
    BaseAmount::new(mul_div(quote.raw(), composite_scale(), price.raw()))
}

pub fn base_for_quote_up(quote: QuoteAmount, price: Price) -> BaseAmount {
    BaseAmount::new(mul_div_up(quote.raw(), composite_scale(), price.raw()))
}

// 2.4: price implied by reserves. quote * 1e30 / base. None if either side is empty.
pub fn reserve_price(base: BaseAmount, quote: QuoteAmount) -> Option<Price> {
    if base.is_zero() {
        return None;
    }
    Price::new(mul_div(quote.raw(), composite_scale(), base.raw()))
}

// k = base * quote, mixed 18 * 6 decimal product
pub fn invariant(base: BaseAmount, quote: QuoteAmount) -> U256 {
    U256::try_from(base.raw().full_mul(quote.raw())).unwrap_or(U256::MAX)
}

// 2.5: |value - reference| / reference in bps, saturating at u32::MAX
pub fn deviation_bps(value: Price, reference: Price) -> u32 {
    let diff = abs_diff(value.raw(), reference.raw());
    let bps = mul_div(diff, U256::from(BPS_DENOMINATOR), reference.raw());
    if bps > U256::from(u32::MAX) {
        u32::MAX
    } else {
        bps.low_u32()
    }
}

// fee owed on an amount. rounds up so the pool never undercharges.
pub fn fee_on(amount: QuoteAmount, fee: FeePips) -> QuoteAmount {
    QuoteAmount::new(mul_div_up(
        amount.raw(),
        U256::from(fee.value()),
        U256::from(PIPS_DENOMINATOR),
    ))
}

// gross amount such that gross - fee_on_gross = net. used by exact-output sells.
pub fn gross_up_for_fee(net: QuoteAmount, fee: FeePips) -> QuoteAmount {
    let keep = PIPS_DENOMINATOR.saturating_sub(fee.value()).max(1);
    QuoteAmount::new(mul_div_up(
        net.raw(),
        U256::from(PIPS_DENOMINATOR),
        U256::from(keep),
    ))
}

// 2.6: pnl = size * (exit - entry), in quote units, sign from position side and price move
pub fn pnl(size: SignedSize, entry: Price, exit: Price) -> i128 {
    let move_abs = abs_diff(exit.raw(), entry.raw());
    let magnitude = mul_div(size.abs().raw(), move_abs, composite_scale());
    let magnitude = u256_to_i128(magnitude).unwrap_or(i128::MAX);
    let price_sign: i128 = if exit >= entry { 1 } else { -1 };
    size.value().signum() * price_sign * magnitude
}

pub fn abs_diff(a: U256, b: U256) -> U256 {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

pub fn u256_to_i128(value: U256) -> Option<i128> {
    if value > U256::from(i128::MAX as u128) {
        None
    } else {
        Some(value.low_u128() as i128)
    }
}

// 2.7: human-facing conversions. Decimal in, fixed-point out, truncating extra digits.
pub fn decimal_to_fixed(value: Decimal, decimals: u32) -> Option<U256> {
    if value < Decimal::ZERO {
        return None;
    }
    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale();
    if scale <= decimals {
        mantissa.checked_mul(U256::exp10((decimals - scale) as usize))
    } else {
        Some(mantissa / U256::exp10((scale - decimals) as usize))
    }
}

pub fn fixed_to_decimal(value: U256, decimals: u32) -> Option<Decimal> {
    let raw = u256_to_i128(value)?;
    Decimal::try_from_i128_with_scale(raw, decimals)
        .ok()
        .map(|d| d.normalize())
}

// exact decimal rendering, no precision limit
pub fn format_fixed(value: U256, decimals: u32) -> String {
    let scale = U256::exp10(decimals as usize);
    let whole = value / scale;
    let frac = value % scale;
    if frac.is_zero() {
        return whole.to_string();
    }
    let digits = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

pub fn parse_fixed(text: &str, decimals: u32) -> Option<U256> {
    let text = text.trim();
    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).ok()?
    };

    let mut frac_digits: String = frac.chars().take(decimals as usize).collect();
    while frac_digits.len() < decimals as usize {
        frac_digits.push('0');
    }
    let frac = if frac_digits.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(&frac_digits).ok()?
    };

    whole
        .checked_mul(U256::exp10(decimals as usize))?
        .checked_add(frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use rust_decimal_macros::dec;

    fn eth(units: u64) -> BaseAmount {
        BaseAmount::from_whole(units)
    }

    fn usd(units: u64) -> QuoteAmount {
        QuoteAmount::from_whole(units)
    }

    #[test]
    fn scale_constants() {
        assert_eq!(precision(), U256::from(1_000_000_000_000_000_000u64));
        assert_eq!(decimal_bridge(), U256::from(1_000_000_000_000u64));
        assert_eq!(composite_scale(), decimal_bridge() * precision());
    }

    #[test]
    fn notional_one_eth_at_2000() {
        let price = Price::from_whole(2000);
        assert_eq!(notional(eth(1), price), usd(2000));
    }

    #[test]
    fn notional_fractional_size() {
        // 0.025 ETH at $2000 = $50
        let size = BaseAmount::from_decimal(dec!(0.025)).unwrap();
        assert_eq!(notional(size, Price::from_whole(2000)), usd(50));
    }

    #[test]
    fn base_for_quote_inverts_notional() {
        let price = Price::from_whole(2000);
        assert_eq!(base_for_quote(usd(2000), price), eth(1));
    }

    #[test]
    fn rounding_up_differs_by_at_most_one() {
        let price = Price::from_decimal(dec!(1999.999999999999999999)).unwrap();
        let size = BaseAmount::from_decimal(dec!(0.333333333333333333)).unwrap();
        let down = notional(size, price);
        let up = notional_up(size, price);
        assert!(up.raw() - down.raw() <= U256::one());
    }

    #[test]
    fn reserve_price_from_reserves() {
        // 1000 ETH against 2,000,000 USDC = $2000
        let price = reserve_price(eth(1000), usd(2_000_000)).unwrap();
        assert_eq!(price, Price::from_whole(2000));
        assert!(reserve_price(BaseAmount::zero(), usd(1)).is_none());
        assert!(reserve_price(eth(1), QuoteAmount::zero()).is_none());
    }

    #[test]
    fn decimal_bridge_round_trip_truncates() {
        let value_18 = U256::from(1_999_999_999_999u64); // just under 2e12
        assert_eq!(to_quote_decimals(value_18), QuoteAmount::new(U256::one()));
        assert_eq!(from_quote_decimals(QuoteAmount::new(U256::one())), decimal_bridge());
    }

    #[test]
    fn deviation_in_bps() {
        let spot = Price::from_whole(2000);
        assert_eq!(deviation_bps(Price::from_whole(2110), spot), 550);
        assert_eq!(deviation_bps(Price::from_whole(1900), spot), 500);
        assert_eq!(deviation_bps(spot, spot), 0);
    }

    #[test]
    fn fee_rounds_up() {
        // 0.3% of $1 = 0.003 exactly
        assert_eq!(fee_on(usd(1), FeePips(3000)), QuoteAmount::new(U256::from(3000u64)));
        // 0.3% of 1 micro-dollar rounds up to 1 unit
        assert_eq!(fee_on(QuoteAmount::new(U256::one()), FeePips(3000)), QuoteAmount::new(U256::one()));
        assert_eq!(fee_on(usd(100), FeePips(0)), QuoteAmount::zero());
    }

    #[test]
    fn gross_up_covers_fee() {
        let fee = FeePips(3000);
        let net = usd(997);
        let gross = gross_up_for_fee(net, fee);
        assert!(gross.raw() - fee_on(gross, fee).raw() >= net.raw() - U256::one());
        assert_eq!(gross, usd(1000));
    }

    #[test]
    fn pnl_signs() {
        let long = SignedSize::from_side(Side::Long, eth(2)).unwrap();
        let short = SignedSize::from_side(Side::Short, eth(2)).unwrap();
        let entry = Price::from_whole(2000);
        let up = Price::from_whole(2100);
        let down = Price::from_whole(1900);

        assert_eq!(pnl(long, entry, up), 200_000_000);
        assert_eq!(pnl(long, entry, down), -200_000_000);
        assert_eq!(pnl(short, entry, up), -200_000_000);
        assert_eq!(pnl(short, entry, down), 200_000_000);
        assert_eq!(pnl(long, entry, entry), 0);
    }

    #[test]
    fn format_and_parse() {
        assert_eq!(format_fixed(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_fixed(U256::from(42u64), 6), "0.000042");
        assert_eq!(format_fixed(U256::from(7_000_000u64), 6), "7");
        assert_eq!(parse_fixed("1.5", 6), Some(U256::from(1_500_000u64)));
        assert_eq!(parse_fixed(".25", 6), Some(U256::from(250_000u64)));
        assert_eq!(parse_fixed("3", 6), Some(U256::from(3_000_000u64)));
        assert_eq!(parse_fixed("1.2345678", 6), Some(U256::from(1_234_567u64)));
        assert_eq!(parse_fixed("-1", 6), None);
        assert_eq!(parse_fixed("abc", 6), None);
        assert_eq!(parse_fixed("", 6), None);
    }

    #[test]
    fn decimal_conversions() {
        assert_eq!(decimal_to_fixed(dec!(2.5), 6), Some(U256::from(2_500_000u64)));
        assert_eq!(decimal_to_fixed(dec!(-2.5), 6), None);
        assert_eq!(fixed_to_decimal(U256::from(2_500_000u64), 6), Some(dec!(2.5)));
    }
}
