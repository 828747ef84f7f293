//! Criterion benchmarks for resona-core primitives
//!
//! Run with: cargo bench -p resona-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use resona_core::{FractionalRead, OnePole, Resonator, Tables, WaveguideDelay};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

fn bench_sine_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tables");
    let tables = Tables::shared();

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("sin", block_size), &block_size, |b, &n| {
            let inc = 440.0 / SAMPLE_RATE;
            b.iter(|| {
                let mut phase = 0.0f32;
                for _ in 0..n {
                    black_box(tables.sin(black_box(phase)));
                    phase += inc;
                }
            });
        });
    }

    group.bench_function("build", |b| b.iter(|| black_box(Tables::new())));
    group.finish();
}

fn bench_waveguide(c: &mut Criterion) {
    let mut group = c.benchmark_group("WaveguideDelay");
    let tables = Tables::shared();

    for (name, mode) in [
        ("linear", FractionalRead::Linear),
        ("allpass", FractionalRead::Allpass),
        ("sinc", FractionalRead::Sinc),
    ] {
        for &block_size in BLOCK_SIZES {
            group.bench_with_input(BenchmarkId::new(name, block_size), &block_size, |b, &n| {
                let mut line = WaveguideDelay::for_lowest_frequency(SAMPLE_RATE, 20.0);
                line.set_fractional_read(mode);
                line.set_delay(218.3);
                let mut loss = OnePole::with_coeff(0.2);
                line.write(1.0);
                b.iter(|| {
                    for _ in 0..n {
                        let y = line.read(tables);
                        line.write(loss.process(y) * 0.995);
                        black_box(y);
                    }
                });
            });
        }
    }
    group.finish();
}

fn bench_resonator_bank(c: &mut Criterion) {
    let mut group = c.benchmark_group("Resonator");
    for &block_size in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("bank5", block_size), &block_size, |b, &n| {
            let mut bank: Vec<Resonator> = [100.0, 200.0, 400.0, 800.0, 1600.0]
                .iter()
                .map(|&f| Resonator::new(SAMPLE_RATE, f, 60.0))
                .collect();
            b.iter(|| {
                for i in 0..n {
                    let x = if i == 0 { 1.0 } else { 0.0 };
                    let y: f32 = bank.iter_mut().map(|r| r.process(x)).sum();
                    black_box(y);
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sine_table, bench_waveguide, bench_resonator_bank);
criterion_main!(benches);
