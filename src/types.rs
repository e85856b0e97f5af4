// 1.0: all the primitives live here. ids, sides, fixed-point amounts, timestamps.
// every amount is an integer in its asset's native decimals. each is a newtype so a
// 6-decimal quote can never be passed where an 18-decimal base or price is expected.

use crate::math;
use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

// reference to an external spot feed (e.g. "chainlink:ETH/USD")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedId(pub String);

impl FeedId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Long = profit when price goes up. Short = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(&self) -> i128 {
        match self {
            Side::Long => 1,
            Side::Short => -1,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fixed-point amount: {0:?}")]
pub struct ParseAmountError(pub String);

// 1.1: unsigned fixed-point amounts. Display and serde use the exact decimal string.
macro_rules! fixed_amount {
    ($(#[$meta:meta])* $name:ident, $decimals:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(U256);

        impl $name {
            pub const DECIMALS: u32 = $decimals;

            pub fn new(raw: U256) -> Self {
                Self(raw)
            }

            pub fn zero() -> Self {
                Self(U256::zero())
            }

            pub fn from_whole(units: u64) -> Self {
                Self(U256::from(units) * U256::exp10(Self::DECIMALS as usize))
            }

            pub fn from_decimal(value: Decimal) -> Option<Self> {
                math::decimal_to_fixed(value, Self::DECIMALS).map(Self)
            }

            pub fn to_decimal(&self) -> Option<Decimal> {
                math::fixed_to_decimal(self.0, Self::DECIMALS)
            }

            pub fn raw(&self) -> U256 {
                self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            pub fn checked_add(&self, other: Self) -> Option<Self> {
                self.0.checked_add(other.0).map(Self)
            }

            pub fn checked_sub(&self, other: Self) -> Option<Self> {
                self.0.checked_sub(other.0).map(Self)
            }

            pub fn saturating_sub(&self, other: Self) -> Self {
                Self(self.0.saturating_sub(other.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", math::format_fixed(self.0, Self::DECIMALS))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseAmountError;

            fn try_from(text: String) -> Result<Self, Self::Error> {
                math::parse_fixed(&text, Self::DECIMALS)
                    .map(Self)
                    .ok_or(ParseAmountError(text))
            }
        }
    };
}

fixed_amount!(
    /// Base-asset quantity, 18 decimals.
    BaseAmount,
    math::BASE_DECIMALS
);

fixed_amount!(
    /// Quote-asset quantity (collateral, notional, OI, fees), 6 decimals.
    QuoteAmount,
    math::QUOTE_DECIMALS
);

// 1.2: quote per unit of base, 18 decimals. always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Price(U256);

impl Price {
    pub const DECIMALS: u32 = math::PRICE_DECIMALS;

    #[must_use]
    pub fn new(raw: U256) -> Option<Self> {
        if raw.is_zero() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn new_unchecked(raw: U256) -> Self {
        debug_assert!(!raw.is_zero());
        Self(raw)
    }

    pub fn from_whole(units: u64) -> Self {
        Self::new_unchecked(U256::from(units) * U256::exp10(Self::DECIMALS as usize))
    }

    #[must_use]
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        math::decimal_to_fixed(value, Self::DECIMALS).and_then(Self::new)
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        math::fixed_to_decimal(self.0, Self::DECIMALS)
    }

    pub fn raw(&self) -> U256 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", math::format_fixed(self.0, Self::DECIMALS))
    }
}

impl From<Price> for String {
    fn from(value: Price) -> String {
        value.to_string()
    }
}

impl TryFrom<String> for Price {
    type Error = ParseAmountError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        math::parse_fixed(&text, Self::DECIMALS)
            .and_then(Price::new)
            .ok_or(ParseAmountError(text))
    }
}

// 1.3: signed base size: positive = long, negative = short. 18 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedSize(i128);

impl SignedSize {
    pub fn new(raw: i128) -> Self {
        Self(raw)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    // None when the magnitude does not fit an i128
    pub fn from_side(side: Side, size: BaseAmount) -> Option<Self> {
        math::u256_to_i128(size.raw()).map(|abs| Self(side.sign() * abs))
    }

    pub fn value(&self) -> i128 {
        self.0
    }

    pub fn abs(&self) -> BaseAmount {
        BaseAmount::new(U256::from(self.0.unsigned_abs()))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn side(&self) -> Option<Side> {
        match self.0.signum() {
            1 => Some(Side::Long),
            -1 => Some(Side::Short),
            _ => None,
        }
    }
}

impl fmt::Display for SignedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}", sign, self.abs())
    }
}

// 1.4: trade fee in pips. 1_000_000 pips = 100%, 3000 = 0.30%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeePips(pub u32);

impl FeePips {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FeePips {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}pips", self.0)
    }
}

// 1.5: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn millis_since(&self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signed_size_operations() {
        let long = SignedSize::from_side(Side::Long, BaseAmount::from_whole(10)).unwrap();
        assert_eq!(long.side(), Some(Side::Long));
        assert_eq!(long.abs(), BaseAmount::from_whole(10));

        let short = SignedSize::from_side(Side::Short, BaseAmount::from_whole(10)).unwrap();
        assert_eq!(short.side(), Some(Side::Short));
        assert_eq!(short.abs(), BaseAmount::from_whole(10));
        assert!(short.value() < 0);

        assert_eq!(SignedSize::zero().side(), None);
    }

    #[test]
    fn price_rejects_zero() {
        assert!(Price::new(U256::zero()).is_none());
        assert!(Price::from_decimal(dec!(0)).is_none());
        assert!(Price::from_decimal(dec!(-5)).is_none());
    }

    #[test]
    fn decimal_round_trip_display() {
        let price = Price::from_decimal(dec!(2000.5)).unwrap();
        assert_eq!(price.to_string(), "2000.5");
        assert_eq!(price.to_decimal(), Some(dec!(2000.5)));

        let quote = QuoteAmount::from_decimal(dec!(12.345678)).unwrap();
        assert_eq!(quote.raw(), U256::from(12_345_678u64));
        assert_eq!(quote.to_string(), "12.345678");
    }

    #[test]
    fn quote_truncates_extra_digits() {
        // 6-decimal asset, the 7th digit is dropped
        let quote = QuoteAmount::from_decimal(dec!(1.0000009)).unwrap();
        assert_eq!(quote.raw(), U256::from(1_000_000u64));
    }

    #[test]
    fn amounts_serialize_as_decimal_strings() {
        let base = BaseAmount::from_decimal(dec!(1.5)).unwrap();
        let json = serde_json::to_string(&base).unwrap();
        assert_eq!(json, "\"1.5\"");
        let back: BaseAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, base);

        assert!(serde_json::from_str::<Price>("\"0\"").is_err());
    }

    #[test]
    fn timestamp_elapsed() {
        let t0 = Timestamp::from_millis(1_000);
        let t1 = Timestamp::from_millis(3_601_000);
        assert_eq!(t1.millis_since(t0), 3_600_000);
    }
}
