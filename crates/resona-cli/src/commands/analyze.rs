//! Render a note in memory and report its level and pitch.

use clap::Args;
use resona_core::{linear_to_db, midi_to_freq};
use resona_synth::{Kernel, Synth};
use serde::Serialize;

use super::common::{EngineArgs, SynthTask, with_synth};

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    engine: EngineArgs,

    /// MIDI note number (fractional notes are allowed)
    #[arg(short, long, default_value = "69")]
    note: f32,

    /// Note velocity (0-1)
    #[arg(long, default_value = "1.0")]
    velocity: f32,

    /// Number of frames to render
    #[arg(short, long, default_value = "4096")]
    frames: usize,

    /// Frames per process() call
    #[arg(long, default_value = "512")]
    block: usize,

    /// Send note-off after this many frames
    #[arg(long)]
    release_at: Option<usize>,

    /// Print a JSON report instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    engine: String,
    preset: Option<String>,
    sample_rate: u32,
    note: f32,
    velocity: f32,
    frames: usize,
    peak: f32,
    peak_db: f32,
    rms: f32,
    rms_db: f32,
    expected_hz: f32,
    fundamental_hz: Option<f32>,
    active_voices: usize,
}

struct Render {
    note: f32,
    velocity: f32,
    frames: usize,
    block: usize,
    release_at: Option<usize>,
}

struct Rendered {
    left: Vec<f32>,
    right: Vec<f32>,
    active_voices: usize,
}

impl SynthTask for Render {
    type Output = Rendered;

    fn run<K: Kernel>(self, mut synth: Synth<K>) -> anyhow::Result<Rendered> {
        let mut left = vec![0.0f32; self.frames];
        let mut right = vec![0.0f32; self.frames];

        synth.note_on(self.note, self.velocity);
        let block = self.block.max(1);
        let mut start = 0;
        while start < self.frames {
            let end = (start + block).min(self.frames);
            if let Some(at) = self.release_at
                && (start..end).contains(&at)
            {
                synth.note_off(self.note);
            }
            synth.process(&mut left[start..end], &mut right[start..end]);
            start = end;
        }

        Ok(Rendered {
            left,
            right,
            active_voices: synth.active_voice_count(),
        })
    }
}

/// Run the analyze command.
pub fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let cfg = args.engine.load()?;
    let sample_rate = cfg.sample_rate as f32;
    let rendered = with_synth(
        &cfg,
        Render {
            note: args.note,
            velocity: args.velocity,
            frames: args.frames,
            block: args.block,
            release_at: args.release_at,
        },
    )?;

    let peak = rendered
        .left
        .iter()
        .chain(&rendered.right)
        .fold(0.0f32, |m, s| m.max(s.abs()));
    let rms = rms(&rendered.left);
    // Skip the attack so transients do not dominate the pitch estimate.
    let steady = &rendered.left[rendered.left.len() / 4..];

    let report = Report {
        engine: cfg.engine.name().to_string(),
        preset: cfg.preset.clone(),
        sample_rate: cfg.sample_rate,
        note: args.note,
        velocity: args.velocity,
        frames: args.frames,
        peak,
        peak_db: linear_to_db(peak),
        rms,
        rms_db: linear_to_db(rms),
        expected_hz: midi_to_freq(args.note),
        fundamental_hz: estimate_fundamental(steady, sample_rate),
        active_voices: rendered.active_voices,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Engine:        {}", report.engine);
    if let Some(preset) = &report.preset {
        println!("Preset:        {preset}");
    }
    println!(
        "Note:          {:.2} (velocity {:.2}, expected {:.2} Hz)",
        report.note, report.velocity, report.expected_hz
    );
    println!(
        "Rendered:      {} frames at {} Hz",
        report.frames, report.sample_rate
    );
    println!("Peak:          {:.4} ({:.1} dBFS)", report.peak, report.peak_db);
    println!("RMS:           {:.4} ({:.1} dBFS)", report.rms, report.rms_db);
    match report.fundamental_hz {
        Some(hz) => println!("Fundamental:   {hz:.2} Hz"),
        None => println!("Fundamental:   (none detected)"),
    }
    println!("Active voices: {}", report.active_voices);
    Ok(())
}

fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Autocorrelation pitch estimate between 30 Hz and 4 kHz.
///
/// Takes the first correlation peak within 90% of the strongest one, which
/// favors the true period over its multiples, then refines it with
/// parabolic interpolation.
fn estimate_fundamental(signal: &[f32], sample_rate: f32) -> Option<f32> {
    if rms(signal) < 1e-4 {
        return None;
    }
    let min_lag = ((sample_rate / 4000.0) as usize).max(2);
    let max_lag = ((sample_rate / 30.0) as usize).min(signal.len() / 2);
    if max_lag <= min_lag + 1 {
        return None;
    }

    let correlation: Vec<f32> = (0..=max_lag + 1)
        .map(|lag| {
            if lag < min_lag - 1 {
                return 0.0;
            }
            let n = signal.len() - lag;
            let (mut xy, mut xx, mut yy) = (0.0f32, 0.0f32, 0.0f32);
            for i in 0..n {
                let (x, y) = (signal[i], signal[i + lag]);
                xy += x * y;
                xx += x * x;
                yy += y * y;
            }
            let norm = (xx * yy).sqrt();
            if norm > 0.0 { xy / norm } else { 0.0 }
        })
        .collect();

    let best = correlation[min_lag..=max_lag]
        .iter()
        .copied()
        .fold(f32::MIN, f32::max);
    if best < 0.3 {
        return None;
    }

    let lag = (min_lag..=max_lag).find(|&lag| {
        let r = correlation[lag];
        r >= 0.9 * best && r >= correlation[lag - 1] && r >= correlation[lag + 1]
    })?;

    let (a, b, c) = (
        correlation[lag - 1],
        correlation[lag],
        correlation[lag + 1],
    );
    let denom = a - 2.0 * b + c;
    let offset = if denom.abs() > 1e-12 {
        (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    Some(sample_rate / (lag as f32 + offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn tone(hz: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / SR;
                (std::f32::consts::TAU * hz * t).sin()
                    + 0.5 * (std::f32::consts::TAU * 2.0 * hz * t).sin()
            })
            .collect()
    }

    #[test]
    fn estimates_harmonic_tone() {
        for hz in [110.0, 261.63, 440.0, 1000.0] {
            let estimate = estimate_fundamental(&tone(hz, 4096), SR).unwrap();
            assert!((estimate - hz).abs() / hz < 0.01, "{hz}: {estimate}");
        }
    }

    #[test]
    fn silence_has_no_pitch() {
        assert!(estimate_fundamental(&[0.0; 4096], SR).is_none());
    }

    #[test]
    fn short_signal_has_no_pitch() {
        assert!(estimate_fundamental(&tone(440.0, 16), SR).is_none());
    }

    #[test]
    fn rms_of_unit_square_is_one() {
        let square: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!((rms(&square) - 1.0).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }
}
