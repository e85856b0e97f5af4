//! Admission control for position-opening trades.
//!
//! Three independent checks: margin sufficiency, open-interest cap and the
//! vAMM-vs-spot price band. All of them run before any state is written, so a
//! rejected intent leaves the market untouched. Cheapest first: margin is pure
//! arithmetic on the intent, OI reads one counter, the band needs a spot price.

use crate::math;
use crate::market::MarketParams;
use crate::types::{Price, QuoteAmount, Side};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Every market refuses opens once the curve is 5% from spot.
pub const PRICE_BAND_BPS: u32 = 500;

/// Engine-wide risk thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParams {
    /// Max |vamm - spot| / spot before opening trades are refused (500 = 5%).
    pub price_band_bps: u32,
    /// Max price move a proportional admin liquidity addition may cause (1000 = 10%).
    pub max_rebalance_deviation_bps: u32,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            price_band_bps: PRICE_BAND_BPS,
            max_rebalance_deviation_bps: 1_000,
        }
    }
}

/// Inputs for one opening trade.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub side: Side,
    pub notional: QuoteAmount,
    pub margin: QuoteAmount,
    /// Current OI on `side`
    pub current_oi: QuoteAmount,
    pub vamm_price: Price,
    /// Only set when the market has a spot reference configured and it answered.
    pub spot_reference: Option<Price>,
}

/// What the gate computed on the way to accepting a trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub required_margin: QuoteAmount,
    pub oi_after: QuoteAmount,
}

/// notional / max_leverage, floored at the market's minimum margin.
pub fn required_margin(notional: QuoteAmount, params: &MarketParams) -> QuoteAmount {
    let leverage = U256::from(params.max_leverage.max(1));
    let by_leverage = QuoteAmount::new(notional.raw() / leverage);
    by_leverage.max(params.min_margin)
}

pub fn check_margin(
    provided: QuoteAmount,
    notional: QuoteAmount,
    params: &MarketParams,
) -> Result<QuoteAmount, RiskError> {
    let required = required_margin(notional, params);
    if provided < required {
        return Err(RiskError::InsufficientMargin { provided, required });
    }
    Ok(required)
}

pub fn check_open_interest(
    side: Side,
    current: QuoteAmount,
    notional: QuoteAmount,
    cap: QuoteAmount,
) -> Result<QuoteAmount, RiskError> {
    match current.checked_add(notional) {
        Some(after) if after <= cap => Ok(after),
        _ => Err(RiskError::OpenInterestCapExceeded {
            side,
            current,
            notional,
            cap,
        }),
    }
}

/// No reference means no band to enforce.
pub fn check_price_band(vamm_price: Price, spot: Option<Price>, max_bps: u32) -> Result<(), RiskError> {
    let Some(spot) = spot else {
        return Ok(());
    };
    let deviation_bps = math::deviation_bps(vamm_price, spot);
    if deviation_bps > max_bps {
        return Err(RiskError::PriceBandExceeded {
            deviation_bps,
            max_bps,
        });
    }
    Ok(())
}

// 6.1: the full gate. every check must pass.
pub fn admit_open(
    request: &OpenRequest,
    market: &MarketParams,
    risk: &RiskParams,
) -> Result<Admission, RiskError> {
    let required_margin = check_margin(request.margin, request.notional, market)?;
    let oi_after = check_open_interest(
        request.side,
        request.current_oi,
        request.notional,
        market.max_oi_cap,
    )?;
    check_price_band(request.vamm_price, request.spot_reference, risk.price_band_bps)?;

    Ok(Admission {
        required_margin,
        oi_after,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskError {
    #[error("Price band exceeded: vAMM is {deviation_bps} bps from spot (max {max_bps})")]
    PriceBandExceeded { deviation_bps: u32, max_bps: u32 },

    #[error("Open interest cap exceeded on {side:?}: {current} + {notional} > {cap}")]
    OpenInterestCapExceeded {
        side: Side,
        current: QuoteAmount,
        notional: QuoteAmount,
        cap: QuoteAmount,
    },

    #[error("Insufficient margin: provided {provided}, required {required}")]
    InsufficientMargin {
        provided: QuoteAmount,
        required: QuoteAmount,
    },
}
