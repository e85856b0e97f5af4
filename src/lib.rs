// vamm-core: virtual AMM market engine for perpetual futures.
// prices come from a constant-product curve over virtual reserves, blended with an
// external spot price. positions and collateral live behind a ledger trait.
// all computation is deterministic; the only outside input is the oracle.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: ids, Side, Price, BaseAmount, QuoteAmount, FeePips, Timestamp
//   2.x  math.rs: fixed-point scales, mul_div, notional, reserve price, pnl
//   3.x  oracle.rs: spot price adapter + mean-price combinator
//   4.x  vamm.rs: virtual reserves, exact-in/exact-out swap pricing, settlement
//   5.x  funding.rs: hourly funding index, dynamic trade fee
//   6.x  risk.rs: price band, OI cap, margin floor
//   7.x  ledger.rs: position ledger trait + in-memory ledger
//   7.2  vault.rs: free/locked collateral
//   8.x  engine/: market lifecycle, trades, funding ticks, admin
//   9.x  config.rs: engine settings, env presets, env loading
//   10.x intent.rs: trade intents
//   11.x events.rs: state transition events for observers
//   12.x market.rs: market record + store

// core modules
pub mod engine;
pub mod events;
pub mod funding;
pub mod market;
pub mod math;
pub mod types;
pub mod vamm;

// risk and pricing
pub mod oracle;
pub mod risk;

// integration modules
pub mod config;
pub mod intent;
pub mod ledger;
pub mod vault;

// re exports for convenience
pub use config::{ConfigError, EngineConfig, Environment};
pub use engine::*;
pub use events::*;
pub use funding::*;
pub use intent::*;
pub use ledger::*;
pub use market::*;
pub use oracle::*;
pub use risk::*;
pub use types::*;
pub use vamm::*;
pub use vault::*;
