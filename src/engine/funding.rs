//! Funding index accrual.

use super::core::Engine;
use super::results::{EngineError, FundingResult};
use crate::events::{EventPayload, FundingIndexUpdatedEvent};
use crate::funding::{accrue_index, funding_phase, funding_rate, FundingPhase};
use crate::ledger::PositionLedger;
use crate::types::MarketId;
use tracing::{debug, info};

impl<L: PositionLedger> Engine<L> {
    /// Funding tick. Moves the index at most once per interval; `None` while idle.
    pub fn update_funding(&mut self, market_id: MarketId) -> Result<Option<FundingResult>, EngineError> {
        let market = self.markets.get_active(market_id)?;
        let phase = funding_phase(market.last_funding_time, self.current_time, &self.config.funding);
        if let FundingPhase::Idle { remaining_ms } = phase {
            debug!(?market_id, remaining_ms, "funding not due");
            return Ok(None);
        }
        self.accrue_funding(market_id)
    }

    // trades call this after committing. a missing market here is a no-op
    pub(super) fn accrue_funding_if_due(&mut self, market_id: MarketId) -> Option<FundingResult> {
        self.update_funding(market_id).ok().flatten()
    }

    fn accrue_funding(&mut self, market_id: MarketId) -> Result<Option<FundingResult>, EngineError> {
        let market = self.markets.get_active(market_id)?;
        let breakdown = self.breakdown_for(market)?;
        let mark_price = breakdown.mark_price;
        let reference_price = match (breakdown.spot_trusted, breakdown.spot_price) {
            (true, Some(spot)) => spot,
            _ => mark_price,
        };
        let rate = funding_rate(mark_price, reference_price, &self.config.funding);

        let now = self.current_time;
        let market = self.markets.get_active_mut(market_id)?;
        market.global_funding_index = accrue_index(market.global_funding_index, rate.hourly);
        market.last_funding_rate = rate.hourly;
        market.instantaneous_funding_rate = rate.instantaneous;
        market.last_funding_time = now;
        market.last_updated = now;
        let global_funding_index = market.global_funding_index;

        info!(
            ?market_id,
            funding_rate = rate.hourly,
            global_funding_index,
            %mark_price,
            %reference_price,
            "funding accrued"
        );
        self.emit_event(EventPayload::FundingIndexUpdated(FundingIndexUpdatedEvent {
            market_id,
            funding_rate: rate.hourly,
            global_funding_index,
            mark_price,
            reference_price,
        }));

        Ok(Some(FundingResult {
            market_id,
            funding_rate: rate.hourly,
            instantaneous_rate: rate.instantaneous,
            global_funding_index,
            mark_price,
            reference_price,
        }))
    }
}
