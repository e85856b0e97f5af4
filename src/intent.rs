//! Trade intents: what a trader asks the engine to do.

use crate::types::{AccountId, BaseAmount, MarketId, PositionId, Price, QuoteAmount, Side};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeIntent {
    Open {
        trader: AccountId,
        market_id: MarketId,
        side: Side,
        size: BaseAmount,
        margin: QuoteAmount,
        /// Worst acceptable mark price: a ceiling for longs, a floor for shorts.
        price_limit: Option<Price>,
    },
    Close {
        trader: AccountId,
        market_id: MarketId,
        position_id: PositionId,
        price_limit: Option<Price>,
    },
    AddMargin {
        trader: AccountId,
        position_id: PositionId,
        amount: QuoteAmount,
    },
    RemoveMargin {
        trader: AccountId,
        position_id: PositionId,
        amount: QuoteAmount,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
    Open,
    Close,
    AddMargin,
    RemoveMargin,
}

impl TradeIntent {
    pub fn kind(&self) -> IntentKind {
        match self {
            TradeIntent::Open { .. } => IntentKind::Open,
            TradeIntent::Close { .. } => IntentKind::Close,
            TradeIntent::AddMargin { .. } => IntentKind::AddMargin,
            TradeIntent::RemoveMargin { .. } => IntentKind::RemoveMargin,
        }
    }

    pub fn trader(&self) -> AccountId {
        match self {
            TradeIntent::Open { trader, .. }
            | TradeIntent::Close { trader, .. }
            | TradeIntent::AddMargin { trader, .. }
            | TradeIntent::RemoveMargin { trader, .. } => *trader,
        }
    }

    /// Opening trades go through the risk gate, everything else does not.
    pub fn is_opening(&self) -> bool {
        self.kind() == IntentKind::Open
    }
}

/// Price a trade at `mark` would get, checked against the intent's bound.
/// Buying (open long, close short) must not pay above the limit; selling must not receive below it.
pub fn within_limit(buying: bool, mark: Price, limit: Option<Price>) -> bool {
    match limit {
        None => true,
        Some(limit) if buying => mark <= limit,
        Some(limit) => mark >= limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_kind_and_trader() {
        let intent = TradeIntent::Open {
            trader: AccountId(5),
            market_id: MarketId(1),
            side: Side::Short,
            size: BaseAmount::from_whole(1),
            margin: QuoteAmount::from_whole(100),
            price_limit: None,
        };
        assert_eq!(intent.kind(), IntentKind::Open);
        assert_eq!(intent.trader(), AccountId(5));
        assert!(intent.is_opening());

        let intent = TradeIntent::RemoveMargin {
            trader: AccountId(6),
            position_id: PositionId(1),
            amount: QuoteAmount::from_whole(1),
        };
        assert_eq!(intent.kind(), IntentKind::RemoveMargin);
        assert!(!intent.is_opening());
    }

    #[test]
    fn slippage_bounds() {
        let mark = Price::from_whole(2000);
        assert!(within_limit(true, mark, None));
        assert!(within_limit(true, mark, Some(Price::from_whole(2000))));
        assert!(!within_limit(true, mark, Some(Price::from_whole(1999))));
        assert!(within_limit(false, mark, Some(Price::from_whole(1999))));
        assert!(!within_limit(false, mark, Some(Price::from_whole(2001))));
    }
}
