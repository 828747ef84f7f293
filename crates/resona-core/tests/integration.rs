//! Integration tests for resona-core: primitives composed into the loops
//! the synthesis kernels build from them.

use resona_core::{
    DcBlocker, FractionalRead, Lfo, NoteDivision, OnePole, Rng, Tables, TempoContext,
    WaveguideDelay,
};

const SR: f32 = 48000.0;

// ---------------------------------------------------------------------------
// Waveguide loops
// ---------------------------------------------------------------------------

#[test]
fn lossless_loop_repeats_excitation() {
    let tables = Tables::shared();
    let period = 109;
    let mut line = WaveguideDelay::for_lowest_frequency(SR, 20.0);
    line.set_fractional_read(FractionalRead::Integer);
    line.set_delay(period as f32);

    let mut rng = Rng::new(11);
    let excitation: Vec<f32> = (0..period).map(|_| rng.next_bipolar()).collect();
    for &x in &excitation {
        line.write(x);
    }

    for n in 0..period * 5 {
        let y = line.read(tables);
        assert_eq!(y, excitation[n % period], "sample {n}");
        line.write(y);
    }
}

#[test]
fn lossy_loop_decays_every_period() {
    let tables = Tables::shared();
    let period = 64;
    let mut line = WaveguideDelay::new(256);
    line.set_delay(period as f32);
    let mut loss = OnePole::with_coeff(0.3);
    for i in 0..period {
        line.write(if i < period / 2 { 1.0 } else { -1.0 });
    }

    let mut prev_peak = f32::MAX;
    for _ in 0..20 {
        let mut peak = 0.0f32;
        for _ in 0..period {
            let y = line.read(tables);
            peak = peak.max(y.abs());
            line.write(loss.process(y) * 0.99);
        }
        assert!(peak < prev_peak, "{peak} >= {prev_peak}");
        prev_peak = peak;
    }
}

#[test]
fn fractional_loop_tunes_between_integers() {
    // Count zero crossings of a plucked loop with a half-sample fractional delay.
    let tables = Tables::shared();
    let delay = 100.5;
    let mut line = WaveguideDelay::new(512);
    line.set_fractional_read(FractionalRead::Sinc);
    line.set_delay(delay);
    for i in 0..101 {
        let x = (2.0 * std::f32::consts::PI * i as f32 / 100.5).sin();
        line.write(x);
    }
    let mut dc = DcBlocker::new(SR);
    let mut crossings = 0;
    let mut prev = 0.0;
    let seconds = 1.0;
    for _ in 0..(SR * seconds) as usize {
        let y = line.read(tables);
        line.write(y * 0.99995);
        let out = dc.process(y);
        if prev <= 0.0 && out > 0.0 {
            crossings += 1;
        }
        prev = out;
    }
    let expected = SR / delay;
    assert!(
        (crossings as f32 - expected).abs() < 5.0,
        "expected ~{expected} cycles, counted {crossings}"
    );
}

// ---------------------------------------------------------------------------
// Tempo-synced modulation
// ---------------------------------------------------------------------------

#[test]
fn synced_lfo_follows_transport() {
    let mut ctx = TempoContext::playing(120.0);
    let mut lfo = Lfo::new(SR, 5.0);
    lfo.set_tempo_sync(Some(NoteDivision::Quarter));

    for _ in 0..100 {
        lfo.apply_tempo(&ctx);
        assert!((lfo.phase() - ctx.phase_of(NoteDivision::Quarter)).abs() < 1e-5);
        for _ in 0..256 {
            lfo.next();
        }
        ctx.advance(256, SR);
    }
}
