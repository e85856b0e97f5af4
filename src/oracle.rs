// 3.0: spot price oracle adapter.
//
// The engine is agnostic to where spot prices come from. Anything that can answer
// "what is the spot price for this market" implements PriceOracle. The adapter wraps
// it and turns every failure (error, missing feed, zero price) into SpotPrice::Unavailable.
// Nothing an oracle does can abort an engine operation.
//
// 3.1 is the mean-price combinator that turns (vAMM price, spot price) into the mark price.

use crate::math;
use crate::types::{FeedId, MarketId, Price};
use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// An external spot price source. Prices are raw 18-decimal values.
pub trait PriceOracle: Send + Sync + fmt::Debug {
    /// Spot price for a market from the oracle's default source.
    fn spot_price(&self, market_id: MarketId) -> Result<U256, OracleError>;

    /// Spot price from a specific named feed. Sources without named feeds keep the default.
    fn feed_price(&self, feed: &FeedId) -> Result<U256, OracleError> {
        Err(OracleError::UnknownFeed(feed.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown feed {0}")]
    UnknownFeed(FeedId),

    #[error("No price for market {0:?}")]
    NoPrice(MarketId),
}

/// Why a spot price could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unavailability {
    NoOracle,
    ZeroPrice,
    Failed(String),
}

/// Result of a spot lookup. Callers must handle both arms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpotPrice {
    Available(Price),
    Unavailable(Unavailability),
}

impl SpotPrice {
    pub fn price(&self) -> Option<Price> {
        match self {
            SpotPrice::Available(price) => Some(*price),
            SpotPrice::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SpotPrice::Available(_))
    }

    fn from_raw(result: Result<U256, OracleError>) -> Self {
        match result {
            Ok(raw) => match Price::new(raw) {
                Some(price) => SpotPrice::Available(price),
                None => SpotPrice::Unavailable(Unavailability::ZeroPrice),
            },
            Err(e) => SpotPrice::Unavailable(Unavailability::Failed(e.to_string())),
        }
    }
}

/// Sanity limits applied before a spot price is trusted for blending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleParams {
    pub min_sane_price: Price,
    pub max_sane_price: Price,
    /// Spot further than this from the vAMM price is ignored (5000 = 50%).
    pub max_spot_deviation_bps: u32,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            min_sane_price: Price::from_whole(1),
            max_sane_price: Price::from_whole(100_000),
            max_spot_deviation_bps: 5_000,
        }
    }
}

/// The three prices behind a mark price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub vamm_price: Price,
    pub spot_price: Option<Price>,
    pub mark_price: Price,
    /// False when a spot price existed but was rejected by the sanity checks.
    pub spot_trusted: bool,
}

// 3.1: mean-price combinator. spot outside the sanity band or >50% away from the
// vAMM price is distrusted and the vAMM price is used alone.
pub fn spot_is_sane(vamm_price: Price, spot: Price, params: &OracleParams) -> bool {
    if spot < params.min_sane_price || spot > params.max_sane_price {
        return false;
    }
    math::deviation_bps(spot, vamm_price) <= params.max_spot_deviation_bps
}

pub fn mean_price(vamm_price: Price, spot: Option<Price>, params: &OracleParams) -> PriceBreakdown {
    let Some(spot_price) = spot else {
        return PriceBreakdown {
            vamm_price,
            spot_price: None,
            mark_price: vamm_price,
            spot_trusted: false,
        };
    };

    if !spot_is_sane(vamm_price, spot_price, params) {
        return PriceBreakdown {
            vamm_price,
            spot_price: Some(spot_price),
            mark_price: vamm_price,
            spot_trusted: false,
        };
    }

    let sum = U512::from(vamm_price.raw()) + U512::from(spot_price.raw());
    let mean = U256::try_from(sum / U512::from(2u64)).unwrap_or(U256::MAX);

    PriceBreakdown {
        vamm_price,
        spot_price: Some(spot_price),
        mark_price: Price::new(mean).unwrap_or(vamm_price),
        spot_trusted: true,
    }
}

/// Wraps an optional oracle. Never returns an error.
#[derive(Debug, Clone)]
pub struct OracleAdapter {
    oracle: Option<Arc<dyn PriceOracle>>,
    params: OracleParams,
}

impl OracleAdapter {
    pub fn new(oracle: Arc<dyn PriceOracle>, params: OracleParams) -> Self {
        Self {
            oracle: Some(oracle),
            params,
        }
    }

    pub fn disconnected(params: OracleParams) -> Self {
        Self { oracle: None, params }
    }

    pub fn params(&self) -> &OracleParams {
        &self.params
    }

    pub fn is_connected(&self) -> bool {
        self.oracle.is_some()
    }

    /// Spot price for a market. A configured feed is tried first, then the oracle's default source.
    pub fn spot_price(&self, market_id: MarketId, feed: Option<&FeedId>) -> SpotPrice {
        let Some(oracle) = &self.oracle else {
            return SpotPrice::Unavailable(Unavailability::NoOracle);
        };

        if let Some(feed) = feed {
            match SpotPrice::from_raw(oracle.feed_price(feed)) {
                SpotPrice::Available(price) => return SpotPrice::Available(price),
                SpotPrice::Unavailable(reason) => {
                    warn!(?market_id, %feed, ?reason, "spot feed unavailable, trying default source");
                }
            }
        }

        let spot = SpotPrice::from_raw(oracle.spot_price(market_id));
        if let SpotPrice::Unavailable(reason) = &spot {
            warn!(?market_id, ?reason, "spot price unavailable, falling back to vAMM price");
        }
        spot
    }

    pub fn breakdown(&self, market_id: MarketId, feed: Option<&FeedId>, vamm_price: Price) -> PriceBreakdown {
        let spot = self.spot_price(market_id, feed);
        mean_price(vamm_price, spot.price(), &self.params)
    }
}

/// In-memory oracle for tests and simulation. Prices can be changed or broken at any time.
#[derive(Debug, Default)]
pub struct MockOracle {
    prices: RwLock<HashMap<MarketId, Result<U256, OracleError>>>,
    feeds: RwLock<HashMap<FeedId, Result<U256, OracleError>>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, market_id: MarketId, price: Price) {
        self.set_raw(market_id, price.raw());
    }

    pub fn set_raw(&self, market_id: MarketId, raw: U256) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(market_id, Ok(raw));
        }
    }

    pub fn fail(&self, market_id: MarketId, reason: &str) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(market_id, Err(OracleError::Unavailable(reason.to_string())));
        }
    }

    pub fn set_feed_price(&self, feed: FeedId, price: Price) {
        if let Ok(mut feeds) = self.feeds.write() {
            feeds.insert(feed, Ok(price.raw()));
        }
    }

    pub fn fail_feed(&self, feed: FeedId, reason: &str) {
        if let Ok(mut feeds) = self.feeds.write() {
            feeds.insert(feed, Err(OracleError::Unavailable(reason.to_string())));
        }
    }
}

impl PriceOracle for MockOracle {
    fn spot_price(&self, market_id: MarketId) -> Result<U256, OracleError> {
        let prices = self
            .prices
            .read()
            .map_err(|_| OracleError::Unavailable("poisoned".to_string()))?;
        prices
            .get(&market_id)
            .cloned()
            .unwrap_or(Err(OracleError::NoPrice(market_id)))
    }

    fn feed_price(&self, feed: &FeedId) -> Result<U256, OracleError> {
        let feeds = self
            .feeds
            .read()
            .map_err(|_| OracleError::Unavailable("poisoned".to_string()))?;
        feeds
            .get(feed)
            .cloned()
            .unwrap_or_else(|| Err(OracleError::UnknownFeed(feed.clone())))
    }
}
