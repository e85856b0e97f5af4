//! vAMM market engine simulation.
//!
//! Walks one ETH market through its lifecycle: seeding from the oracle, trading
//! against the curve, risk rejections, funding ticks, and operator rebalancing.

use rust_decimal_macros::dec;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use vamm_core::*;

const OPERATOR: AccountId = AccountId(1);
const ALICE: AccountId = AccountId(100);
const BOB: AccountId = AccountId(101);
const ETH: MarketId = MarketId(1);
const HOUR: i64 = 3_600_000;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("vAMM Market Engine Simulation");
    println!("Single ETH market, virtual reserves, blended mark price\n");

    let scenarios: [(&str, fn(&EngineConfig) -> Result<(), EngineError>); 5] = [
        ("trading against the curve", scenario_1_round_trip),
        ("mark price and oracle degradation", scenario_2_mark_price),
        ("risk gate rejections", scenario_3_risk_gate),
        ("funding accrual", scenario_4_funding),
        ("operator rebalancing", scenario_5_admin),
    ];

    for (name, scenario) in scenarios {
        if let Err(e) = scenario(&config) {
            error!(scenario = name, "scenario failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    println!("\nAll simulations completed successfully.");
    ExitCode::SUCCESS
}

fn setup(config: &EngineConfig) -> Result<(Engine, Arc<MockOracle>), EngineError> {
    let oracle = Arc::new(MockOracle::new());
    oracle.set_price(ETH, Price::from_whole(2000));

    let mut engine = Engine::in_memory(config.clone().with_operator(OPERATOR))?.with_oracle(oracle.clone());
    engine.set_time(Timestamp::now());
    engine.initialize_market(
        OPERATOR,
        ETH,
        MarketSetup::new(BaseAmount::from_whole(1_000)).with_feed(FeedId::new("ETH/USD")),
    )?;
    oracle.set_feed_price(FeedId::new("ETH/USD"), Price::from_whole(2000));

    let now = engine.time();
    for trader in [ALICE, BOB] {
        engine.ledger_mut().deposit(trader, QuoteAmount::from_whole(100_000), now)?;
    }
    Ok((engine, oracle))
}

fn print_market(engine: &Engine) -> Result<(), EngineError> {
    let market = engine.get_market_state(ETH)?;
    let breakdown = engine.get_price_breakdown(ETH)?;
    println!(
        "  reserves {} ETH / {} USDC, vAMM ${}, mark ${}, OI long {} short {}",
        market.virtual_base,
        market.virtual_quote,
        breakdown.vamm_price,
        breakdown.mark_price,
        market.total_long_oi,
        market.total_short_oi,
    );
    Ok(())
}

/// Open and close a long: the curve returns to where it started.
fn scenario_1_round_trip(config: &EngineConfig) -> Result<(), EngineError> {
    println!("Scenario 1: Trading Against the Curve\n");
    let (mut engine, _oracle) = setup(config)?;
    print_market(&engine)?;

    let size = BaseAmount::from_decimal(dec!(5)).ok_or(EngineError::MathOverflow)?;
    let opened = engine.open_position(ALICE, ETH, Side::Long, size, QuoteAmount::from_whole(1_000), None)?;
    println!(
        "  Alice longs {} ETH @ ${}, fee {} ({}), margin {}",
        opened.size, opened.entry_price, opened.fee, opened.fee_pips, opened.margin
    );
    print_market(&engine)?;

    let closed = engine.close_position(ALICE, ETH, opened.position_id, None)?;
    println!(
        "  Alice closes @ ${}, realized PnL {} (raw), released {}",
        closed.exit_price, closed.realized_pnl, closed.released
    );
    print_market(&engine)?;
    println!("  invariant drift: {}\n", engine.get_market_state(ETH)?.invariant_drift());
    Ok(())
}

/// Spot blends into the mark until it looks manipulated or disappears.
fn scenario_2_mark_price(config: &EngineConfig) -> Result<(), EngineError> {
    println!("Scenario 2: Mark Price and Oracle Degradation\n");
    let (engine, oracle) = setup(config)?;
    let feed = FeedId::new("ETH/USD");

    for (label, spot) in [("spot $2,100", Some(2100)), ("spot $3,200 (manipulated)", Some(3200)), ("oracle down", None)] {
        match spot {
            Some(price) => oracle.set_feed_price(feed.clone(), Price::from_whole(price)),
            None => {
                oracle.fail_feed(feed.clone(), "stale round");
                oracle.fail(ETH, "rpc timeout");
            }
        }
        let breakdown = engine.get_price_breakdown(ETH)?;
        println!(
            "  {}: vAMM ${}, mark ${}, spot trusted: {}",
            label, breakdown.vamm_price, breakdown.mark_price, breakdown.spot_trusted
        );
    }
    println!();
    Ok(())
}

/// Each admission failure is distinct.
fn scenario_3_risk_gate(config: &EngineConfig) -> Result<(), EngineError> {
    println!("Scenario 3: Risk Gate\n");
    let (mut engine, oracle) = setup(config)?;

    let small = BaseAmount::from_decimal(dec!(0.025)).ok_or(EngineError::MathOverflow)?;
    match engine.open_position(BOB, ETH, Side::Long, small, QuoteAmount::from_whole(5), None) {
        Err(e) if e.is_admission() => println!("  $50 notional with $5 margin: {}", e),
        Err(e) => return Err(e),
        Ok(_) => println!("  $50 notional with $5 margin unexpectedly accepted"),
    }

    // curve at $2000, spot moves to $1890: 5.8% away
    oracle.set_feed_price(FeedId::new("ETH/USD"), Price::from_whole(1890));
    match engine.open_position(BOB, ETH, Side::Long, BaseAmount::from_whole(1), QuoteAmount::from_whole(400), None) {
        Err(e) if e.is_admission() => println!("  vAMM $2000 vs spot $1890: {} ({:?})", e, e.kind()),
        Err(e) => return Err(e),
        Ok(_) => println!("  band check unexpectedly passed"),
    }

    match engine.add_liquidity(ETH) {
        Err(e) => println!("  add liquidity: {} ({:?})\n", e, e.kind()),
        Ok(()) => println!("  add liquidity unexpectedly allowed\n"),
    }
    Ok(())
}

/// The index moves once per hour, however often it is poked.
fn scenario_4_funding(config: &EngineConfig) -> Result<(), EngineError> {
    println!("Scenario 4: Funding Accrual\n");
    let (mut engine, oracle) = setup(config)?;
    oracle.set_feed_price(FeedId::new("ETH/USD"), Price::from_whole(1950));

    for step in 0..4 {
        engine.advance_time(HOUR / 2);
        let result = engine.update_funding(ETH)?;
        let market = engine.get_market_state(ETH)?;
        println!(
            "  t+{}min: {}, index {}",
            (step + 1) * 30,
            if result.is_some() { "accrued" } else { "idle" },
            market.global_funding_index
        );
    }
    println!(
        "  fees now: long {}, short {}\n",
        engine.dynamic_fee(ETH, Side::Long)?,
        engine.dynamic_fee(ETH, Side::Short)?
    );
    Ok(())
}

/// Operator tools: deepen the curve, pause the market, hand over control.
fn scenario_5_admin(config: &EngineConfig) -> Result<(), EngineError> {
    println!("Scenario 5: Operator Rebalancing\n");
    let (mut engine, _oracle) = setup(config)?;

    let price = engine.add_virtual_liquidity(
        OPERATOR,
        ETH,
        BaseAmount::from_whole(1_000),
        QuoteAmount::from_whole(2_000_000),
    )?;
    println!("  doubled depth, price stays ${}", price);
    print_market(&engine)?;

    match engine.add_virtual_liquidity(OPERATOR, ETH, BaseAmount::zero(), QuoteAmount::from_whole(1_000_000)) {
        Err(e) => println!("  lopsided add: {}", e),
        Ok(_) => println!("  lopsided add unexpectedly accepted"),
    }

    engine.deactivate_market(OPERATOR, ETH)?;
    println!("  market active: {}", engine.get_market_state(ETH)?.is_active);
    engine.reactivate_market(OPERATOR, ETH)?;
    engine.transfer_operator(OPERATOR, BOB)?;
    println!("  operator is now {:?}, {} events recorded", engine.operator(), engine.events().len());
    Ok(())
}
