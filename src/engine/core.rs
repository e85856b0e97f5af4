// 8.0 engine/core.rs: main engine. owns every market, the oracle adapter and the ledger.

use super::results::EngineError;
use crate::config::{ConfigError, EngineConfig};
use crate::events::{Event, EventId, EventPayload, MarketInitializedEvent};
use crate::ledger::{InMemoryLedger, PositionLedger};
use crate::market::{Market, MarketError, MarketParams, MarketStore};
use crate::math;
use crate::oracle::{OracleAdapter, PriceOracle};
use crate::types::{AccountId, BaseAmount, FeedId, MarketId, PositionId, Price, Timestamp};
use crate::vamm::{ReserveFootprint, VirtualReserves};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What an operator supplies to open a new market.
#[derive(Debug, Clone)]
pub struct MarketSetup {
    /// Base side of the curve. Quote is derived from the initial price.
    pub virtual_base: BaseAmount,
    pub params: MarketParams,
    pub spot_price_feed: Option<FeedId>,
}

impl MarketSetup {
    pub fn new(virtual_base: BaseAmount) -> Self {
        Self {
            virtual_base,
            params: MarketParams::default(),
            spot_price_feed: None,
        }
    }

    pub fn with_params(mut self, params: MarketParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_feed(mut self, feed: FeedId) -> Self {
        self.spot_price_feed = Some(feed);
        self
    }
}

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine<L: PositionLedger = InMemoryLedger> {
    pub(super) config: EngineConfig,
    pub(super) markets: MarketStore,
    pub(super) oracle: OracleAdapter,
    pub(super) ledger: L,
    // reserves around each open position's opening trade, consumed on close
    pub(super) footprints: HashMap<PositionId, ReserveFootprint>,
    pub(super) operator: AccountId,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

impl Engine<InMemoryLedger> {
    pub fn in_memory(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::new(config, InMemoryLedger::new())
    }
}

impl<L: PositionLedger> Engine<L> {
    pub fn new(config: EngineConfig, ledger: L) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            oracle: OracleAdapter::disconnected(config.oracle.clone()),
            operator: config.operator,
            config,
            markets: MarketStore::new(),
            ledger,
            footprints: HashMap::new(),
            events: Vec::new(),
            next_event_id: 1,
            current_time: Timestamp::from_millis(0),
        })
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.oracle = OracleAdapter::new(oracle, self.config.oracle.clone());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = Timestamp::from_millis(self.current_time.as_millis() + millis);
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn operator(&self) -> AccountId {
        self.operator
    }

    pub fn market_ids(&self) -> Vec<MarketId> {
        self.markets.ids()
    }

    // 8.2: new market. seeded at the oracle's spot price when it has a sane one,
    // otherwise at the configured default.
    pub fn initialize_market(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        setup: MarketSetup,
    ) -> Result<Price, EngineError> {
        self.require_operator(caller)?;
        if self.markets.contains(market_id) {
            return Err(MarketError::AlreadyExists(market_id).into());
        }
        setup.params.validate()?;

        let (initial_price, seeded_from_oracle) = self.seed_price(market_id, setup.spot_price_feed.as_ref())?;
        let virtual_quote = math::notional(setup.virtual_base, initial_price);
        let reserves =
            VirtualReserves::new(setup.virtual_base, virtual_quote).ok_or(MarketError::InvalidReserves)?;

        let market = Market::new(
            market_id,
            reserves,
            setup.params,
            setup.spot_price_feed,
            self.current_time,
        );
        self.markets.insert(market)?;

        info!(?market_id, %initial_price, seeded_from_oracle, "market initialized");
        self.emit_event(EventPayload::MarketInitialized(MarketInitializedEvent {
            market_id,
            virtual_base: reserves.base,
            virtual_quote: reserves.quote,
            k: reserves.k,
            initial_price,
            seeded_from_oracle,
        }));

        Ok(initial_price)
    }

    fn seed_price(&self, market_id: MarketId, feed: Option<&FeedId>) -> Result<(Price, bool), EngineError> {
        let params = self.oracle.params();
        if let Some(spot) = self.oracle.spot_price(market_id, feed).price() {
            if spot >= params.min_sane_price && spot <= params.max_sane_price {
                return Ok((spot, true));
            }
            warn!(?market_id, %spot, "oracle seed price outside sanity band, using default");
        }
        let fallback = self.config.default_price().ok_or(ConfigError::InvalidEngine {
            reason: "default initial price is not a positive price".to_string(),
        })?;
        Ok((fallback, false))
    }

    pub(super) fn require_operator(&self, caller: AccountId) -> Result<(), EngineError> {
        if caller != self.operator {
            warn!(?caller, operator = ?self.operator, "rejected admin call");
            return Err(EngineError::Unauthorized { caller });
        }
        Ok(())
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        debug!(event_id = event.id.0, payload = ?event.payload, "event");

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
