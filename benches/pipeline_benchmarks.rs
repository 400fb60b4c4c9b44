//! Benchmarks for the cyclicality stages and the universe run
//!
//! Covers:
//! - Welch and Lomb-Scargle spectra
//! - Band-pass Hilbert extraction
//! - State-space cycle fitting
//! - Full per-scheme chain and a small universe

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use navcycle_core::hilbert::{CycleExtractionStrategy, SpectralStrategy};
use navcycle_core::spectrum::compute_spectrum;
use navcycle_core::state_space::estimate_cycle;
use navcycle_core::{
    simulate_nav, simulate_universe, CycleAnalysisConfig, CyclePipeline, HilbertConfig,
    SpectrumConfig, SpectrumMethod, StateSpaceConfig, SyntheticNav,
};
use std::f64::consts::PI;

/// Cycle plus deterministic pseudo-noise
fn generate_residual(m: usize, period: f64) -> Vec<f64> {
    (0..m)
        .map(|i| {
            let t = i as f64;
            (2.0 * PI * t / period).sin() + 0.2 * (17.3 * t).sin()
        })
        .collect()
}

fn bench_spectrum(c: &mut Criterion) {
    let mut group = c.benchmark_group("Spectrum");
    let welch = SpectrumConfig::default();
    let lomb = SpectrumConfig {
        method: SpectrumMethod::LombScargle,
        ..SpectrumConfig::default()
    };

    for size in [120, 240, 480].iter() {
        let residual = generate_residual(*size, 24.0);
        group.bench_with_input(BenchmarkId::new("welch", size), size, |b, _| {
            b.iter(|| compute_spectrum(black_box(&residual), &welch))
        });
        group.bench_with_input(BenchmarkId::new("lomb_scargle", size), size, |b, _| {
            b.iter(|| compute_spectrum(black_box(&residual), &lomb))
        });
    }
    group.finish();
}

fn bench_hilbert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Hilbert");
    let config = HilbertConfig::default();

    for size in [120, 480, 1920].iter() {
        let residual = generate_residual(*size, 24.0);
        group.bench_with_input(BenchmarkId::new("spectral", size), size, |b, _| {
            b.iter(|| SpectralStrategy.extract(black_box(&residual), &config))
        });
    }
    group.finish();
}

fn bench_state_space(c: &mut Criterion) {
    let mut group = c.benchmark_group("StateSpace");
    group.sample_size(10);
    let config = StateSpaceConfig {
        cycle_period: 24.0,
        ..StateSpaceConfig::default()
    };

    for size in [120, 240].iter() {
        let residual = generate_residual(*size, 24.0);
        group.bench_with_input(BenchmarkId::new("fit", size), size, |b, _| {
            b.iter(|| estimate_cycle(black_box(&residual), &config))
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pipeline");
    group.sample_size(10);
    let pipeline = CyclePipeline::new(CycleAnalysisConfig::default()).unwrap();
    let spec = SyntheticNav::default();

    let nav = simulate_nav("BENCH", &spec, Some(1)).unwrap();
    group.bench_function("single_scheme_180", |b| {
        b.iter(|| pipeline.analyze_scheme(black_box(&nav)))
    });

    let universe = simulate_universe(16, &spec, Some(2)).unwrap();
    group.bench_function("universe_16", |b| {
        b.iter(|| pipeline.run(black_box(&universe)).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_spectrum,
    bench_hilbert,
    bench_state_space,
    bench_pipeline
);
criterion_main!(benches);
