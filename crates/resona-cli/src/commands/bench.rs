//! Real-time factor measurement.

use clap::Args;
use resona_synth::{Kernel, Synth};
use std::time::{Duration, Instant};

use super::common::{EngineArgs, SynthTask, with_synth};

#[derive(Args)]
pub struct BenchArgs {
    #[command(flatten)]
    engine: EngineArgs,

    /// Number of simultaneous notes
    #[arg(long, default_value = "8")]
    voices: usize,

    /// Seconds of audio to render
    #[arg(long, default_value = "5.0")]
    seconds: f32,

    /// Frames per process() call
    #[arg(long, default_value = "256")]
    block: usize,
}

struct Bench {
    voices: usize,
    frames: usize,
    block: usize,
}

struct Timing {
    elapsed: Duration,
    worst_block: Duration,
    active_voices: usize,
    polyphony: usize,
}

impl SynthTask for Bench {
    type Output = Timing;

    fn run<K: Kernel>(self, mut synth: Synth<K>) -> anyhow::Result<Timing> {
        // Stacked fifths from C2 keep every note inside all engines' ranges.
        for i in 0..self.voices {
            synth.note_on(36.0 + (i * 7 % 48) as f32, 0.8);
        }

        let mut left = vec![0.0f32; self.block];
        let mut right = vec![0.0f32; self.block];
        let mut worst_block = Duration::ZERO;
        let mut rendered = 0;

        let start = Instant::now();
        while rendered < self.frames {
            let n = self.block.min(self.frames - rendered);
            let block_start = Instant::now();
            synth.process(&mut left[..n], &mut right[..n]);
            worst_block = worst_block.max(block_start.elapsed());
            rendered += n;
        }

        Ok(Timing {
            elapsed: start.elapsed(),
            worst_block,
            active_voices: synth.active_voice_count(),
            polyphony: synth.polyphony(),
        })
    }
}

/// Run the bench command.
pub fn run(args: BenchArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.voices > 0, "--voices must be at least 1");
    anyhow::ensure!(args.block > 0, "--block must be at least 1");
    anyhow::ensure!(
        args.seconds.is_finite() && args.seconds > 0.0,
        "--seconds must be positive"
    );

    let mut cfg = args.engine.load()?;
    cfg.polyphony = cfg.polyphony.max(args.voices.min(resona_synth::MAX_POLYPHONY));
    cfg.max_block_size = cfg.max_block_size.max(args.block.min(resona_config::MAX_BLOCK_SIZE));
    let sample_rate = cfg.sample_rate as f32;
    let frames = (args.seconds * sample_rate) as usize;

    let timing = with_synth(
        &cfg,
        Bench {
            voices: args.voices,
            frames,
            block: args.block,
        },
    )?;

    let audio_secs = frames as f64 / f64::from(sample_rate);
    let wall_secs = timing.elapsed.as_secs_f64().max(1e-9);
    let block_budget = args.block as f64 / f64::from(sample_rate);

    println!(
        "Engine:           {} ({} voices requested, polyphony {})",
        cfg.engine, args.voices, timing.polyphony
    );
    println!(
        "Rendered:         {:.2}s of audio in {:.3}s",
        audio_secs, wall_secs
    );
    println!("Real-time factor: {:.1}x", audio_secs / wall_secs);
    println!(
        "Worst block:      {:.1} us of {:.1} us budget ({} frames)",
        timing.worst_block.as_secs_f64() * 1e6,
        block_budget * 1e6,
        args.block
    );
    println!("Voices at end:    {}", timing.active_voices);
    Ok(())
}
