// 5.0: funding. once an hour the global index moves by the mark/spot spread, scaled to an
// hourly rate. positive = perp above spot = longs pay shorts.
// 5.0 has params and the interval gate. 5.1 the rate. 5.2 the funding-driven trade fee.

use crate::math;
use crate::types::{FeePips, Price, Side, Timestamp};
use serde::{Deserialize, Serialize};

pub const FUNDING_INTERVAL_MS: i64 = 3_600_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingParams {
    pub interval_ms: i64,
    // hours per year. turns the instantaneous spread into an hourly rate
    pub annualization_divisor: i128,
}

impl Default for FundingParams {
    fn default() -> Self {
        Self {
            interval_ms: FUNDING_INTERVAL_MS,
            annualization_divisor: 8_760,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeParams {
    // share of the instantaneous funding rate added to (or taken off) the trade fee. 1000 = 10%
    pub funding_fee_share_bps: u32,
    pub max_fee_pips: FeePips,
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            funding_fee_share_bps: 1_000,
            max_fee_pips: FeePips(100_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingPhase {
    Idle { remaining_ms: i64 },
    Due { elapsed_ms: i64 },
}

pub fn funding_phase(last_funding_time: Timestamp, now: Timestamp, params: &FundingParams) -> FundingPhase {
    let elapsed_ms = now.millis_since(last_funding_time);
    if elapsed_ms >= params.interval_ms {
        FundingPhase::Due { elapsed_ms }
    } else {
        FundingPhase::Idle {
            remaining_ms: params.interval_ms - elapsed_ms,
        }
    }
}

/// Both forms of the rate, 1e18 precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRate {
    /// (mark - reference) / reference
    pub instantaneous: i128,
    /// instantaneous / annualization divisor. this is what the index accumulates
    pub hourly: i128,
}

// 5.1: reference is spot when the oracle answered, otherwise mark (zero rate)
pub fn funding_rate(mark: Price, reference: Price, params: &FundingParams) -> FundingRate {
    let spread = math::abs_diff(mark.raw(), reference.raw());
    let magnitude = math::mul_div(spread, math::precision(), reference.raw());
    let magnitude = math::u256_to_i128(magnitude).unwrap_or(i128::MAX);
    let instantaneous = if mark >= reference { magnitude } else { -magnitude };
    let hourly = instantaneous / params.annualization_divisor.max(1);
    FundingRate { instantaneous, hourly }
}

pub fn accrue_index(index: i128, hourly_rate: i128) -> i128 {
    index.saturating_add(hourly_rate)
}

// 5.2: fee nudge in pips. positive when longs should pay more.
pub fn funding_fee_adjustment_pips(instantaneous_rate: i128, params: &FeeParams) -> i64 {
    // rate is 1e18 = 100%, pips are 1e6 = 100%, share is bps
    let divisor = (math::PRECISION_I128 / math::PIPS_DENOMINATOR as i128) * math::BPS_DENOMINATOR as i128;
    let adjustment = instantaneous_rate.saturating_mul(params.funding_fee_share_bps as i128) / divisor;
    adjustment.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Base fee plus the side's share of the funding adjustment, clamped to `[0, max_fee_pips]`.
pub fn dynamic_fee(base: FeePips, instantaneous_rate: i128, side: Side, params: &FeeParams) -> FeePips {
    let adjustment = funding_fee_adjustment_pips(instantaneous_rate, params) as i128 * side.sign();
    let fee = (base.value() as i128 + adjustment).clamp(0, params.max_fee_pips.value() as i128);
    FeePips(fee as u32)
}
