// 8.0: market engine. owns markets, prices trades at the mark price, gates them
// through the risk checks, and hands positions to the ledger.
// single writer: every operation runs to completion before the next one starts.

mod admin;
mod core;
mod funding;
mod positions;
mod pricing;
mod results;
mod swap;

pub use self::core::{Engine, MarketSetup};
pub use results::{
    CloseResult, EngineError, ErrorKind, FundingResult, IntentOutcome, MarginResult, OpenResult, SwapExecution,
};
