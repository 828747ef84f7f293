//! Engine selection shared by the rendering commands.

use anyhow::Context;
use clap::Args;
use resona_config::{EngineConfig, EngineKind};
use resona_synth::{
    AdditiveKernel, FmKernel, GranularKernel, Kernel, PhysicalKernel, Synth, VectorKernel,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Root note of the built-in granular source (A3, 220 Hz).
const SOURCE_ROOT_NOTE: f32 = 57.0;

/// Which engine to build and how to configure it.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Engine: additive, granular, fm, vector or physical
    #[arg(short, long, value_parser = parse_engine, default_value = "fm")]
    pub engine: EngineKind,

    /// Preset name (see `resona engines`)
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Engine configuration TOML; its engine replaces --engine
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Sample rate in Hz (overrides the config file)
    #[arg(long)]
    pub sample_rate: Option<u32>,
}

/// Clap value parser for engine names.
pub fn parse_engine(s: &str) -> Result<EngineKind, String> {
    s.parse::<EngineKind>().map_err(|e| e.to_string())
}

impl EngineArgs {
    /// Resolve the arguments into a validated configuration.
    pub fn load(&self) -> anyhow::Result<EngineConfig> {
        let mut cfg = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EngineConfig::new(self.engine),
        };
        if let Some(preset) = &self.preset {
            cfg.preset = Some(preset.clone());
        }
        if let Some(rate) = self.sample_rate {
            cfg.sample_rate = rate;
        }
        cfg.validate()?;
        tracing::info!(
            engine = %cfg.engine,
            preset = ?cfg.preset,
            sample_rate = cfg.sample_rate,
            "engine configured"
        );
        Ok(cfg)
    }
}

/// Work that runs on a freshly built engine of any kernel type.
pub trait SynthTask {
    /// Value returned by the task.
    type Output;

    /// Run against the engine.
    fn run<K: Kernel>(self, synth: Synth<K>) -> anyhow::Result<Self::Output>;
}

/// Build the configured engine and hand it to `task`.
pub fn with_synth<T: SynthTask>(cfg: &EngineConfig, task: T) -> anyhow::Result<T::Output> {
    let synth_config = cfg.synth_config();
    let sr = synth_config.sample_rate;

    match cfg.engine {
        EngineKind::Additive => {
            let synth = Synth::new(AdditiveKernel::new(sr), cfg.additive_params()?, synth_config);
            task.run(with_gain(synth, cfg))
        }
        EngineKind::Granular => {
            let mut params = cfg.granular_params()?;
            params.set_source(0, Some(harmonic_source(sr, 2.0)));
            params.set_source_index(0);
            params.set_root_note(SOURCE_ROOT_NOTE);
            let synth = Synth::new(GranularKernel::new(sr), params, synth_config);
            task.run(with_gain(synth, cfg))
        }
        EngineKind::Fm => {
            let synth = Synth::new(FmKernel::new(sr), cfg.fm_params()?, synth_config);
            task.run(with_gain(synth, cfg))
        }
        EngineKind::Vector => {
            let synth = Synth::new(VectorKernel::new(sr), cfg.vector_params()?, synth_config);
            task.run(with_gain(synth, cfg))
        }
        EngineKind::Physical => {
            let synth = Synth::new(PhysicalKernel::new(sr), cfg.physical_params()?, synth_config);
            task.run(with_gain(synth, cfg))
        }
    }
}

fn with_gain<K: Kernel>(mut synth: Synth<K>, cfg: &EngineConfig) -> Synth<K> {
    synth.set_master_gain(cfg.master_gain);
    synth
}

/// A 220 Hz tone with eight 1/k harmonics, used as granular source material
/// since the CLI reads no audio files.
pub fn harmonic_source(sample_rate: f32, seconds: f32) -> Arc<[f32]> {
    let len = (sample_rate * seconds) as usize;
    let hz = resona_core::midi_to_freq(SOURCE_ROOT_NOTE);
    let step = std::f32::consts::TAU * hz / sample_rate;
    (0..len)
        .map(|i| {
            let phase = step * i as f32;
            (1..=8)
                .map(|k| (phase * k as f32).sin() / k as f32)
                .sum::<f32>()
                * 0.5
        })
        .collect::<Vec<f32>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names_parse() {
        assert_eq!(parse_engine("granular").unwrap(), EngineKind::Granular);
        assert!(parse_engine("theremin").unwrap_err().contains("theremin"));
    }

    #[test]
    fn harmonic_source_is_bounded() {
        let source = harmonic_source(48000.0, 0.1);
        assert_eq!(source.len(), 4800);
        assert!(source.iter().all(|s| s.abs() <= 1.5));
        assert!(source.iter().any(|s| s.abs() > 0.1));
    }
}
