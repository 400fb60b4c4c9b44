//! Example: Universe Scan
//!
//! Simulates a small fund universe, runs the cyclicality chain on every
//! scheme and prints the ranked summary, the bottom-signal votes and the
//! trough backtest.
//!
//! Usage:
//!   cargo run --example universe_scan [config.toml]
//!
//! Without an argument the built-in defaults are used, with the turning-point
//! prominence scaled to log-NAV cycles. Set `RUST_LOG` to override the
//! configured log level.

use navcycle_core::{
    init_logging, simulate_universe, CycleAnalysisConfig, CyclePipeline, SyntheticNav,
    TurningPointConfig,
};

/// Minimum prominence of a turning point, in log-NAV units.
const LOG_NAV_PROMINENCE: f64 = 0.01;

fn load_config() -> navcycle_core::Result<CycleAnalysisConfig> {
    match std::env::args().nth(1) {
        Some(path) => CycleAnalysisConfig::from_path(path),
        None => Ok(CycleAnalysisConfig {
            turning_points: TurningPointConfig {
                prominence: LOG_NAV_PROMINENCE,
                ..TurningPointConfig::default()
            },
            ..CycleAnalysisConfig::default()
        }),
    }
}

fn main() -> navcycle_core::Result<()> {
    let config = load_config()?;
    let _guard = init_logging(&config.logging)?;

    println!("=== Simulated universe ===\n");
    let base = SyntheticNav {
        n_points: 240,
        period: 36.0,
        ..SyntheticNav::default()
    };
    let universe = simulate_universe(12, &base, Some(42))?;
    println!(
        "  {} schemes, {} month-end observations each, base period {}",
        universe.len(),
        base.n_points,
        base.period
    );

    let pipeline = CyclePipeline::new(config)?;
    println!("  Hilbert strategy: {}", pipeline.strategy_name());
    let report = pipeline.run(&universe)?;

    println!("\n=== Ranked summary ===\n");
    println!(
        "  {:<12} {:>8} {:>8} {:>9} {:>7}",
        "scheme", "score", "raw", "period", "cycles"
    );
    for row in &report.summary.rows {
        let metric = |name: &str| row.metrics.get(name).copied().unwrap_or(f64::NAN);
        println!(
            "  {:<12} {:>8.3} {:>8.3} {:>9.1} {:>7}",
            row.scheme_code,
            row.score,
            row.raw_score,
            metric("dominant_period"),
            metric("num_cycles")
        );
    }

    println!("\n=== Bottom signals ===\n");
    for entry in report.bottom_signals.iter().filter(|b| b.vote.signal) {
        let v = &entry.vote.votes;
        println!(
            "  {:<12} votes={} (trough={}, phase={}, state={})",
            entry.scheme_code, entry.vote.vote_count, v.recent_trough, v.hilbert_phase, v.state_cycle
        );
    }

    println!("\n=== Trough backtest ===\n");
    let hits = report.backtests.iter().filter(|t| t.hit).count();
    println!("  {} trades, {} hits", report.backtests.len(), hits);

    if !report.failures.is_empty() {
        println!("\n=== Failures ===\n");
        for failure in &report.failures {
            println!("  {failure}");
        }
    }

    Ok(())
}
