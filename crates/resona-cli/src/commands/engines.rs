//! Engine and preset listing.

use clap::Args;
use resona_config::EngineKind;
use resona_synth::kernel::fm::ALGORITHMS;
use resona_synth::{
    BodyProfile, Excitation, PhysicalModel, SchedulingMode, SourceWaveform, WindowShape,
};

use super::common::parse_engine;

#[derive(Args)]
pub struct EnginesArgs {
    /// Show only this engine
    #[arg(value_parser = parse_engine)]
    engine: Option<EngineKind>,
}

/// Run the engines command.
pub fn run(args: EnginesArgs) -> anyhow::Result<()> {
    let kinds: Vec<EngineKind> = match args.engine {
        Some(kind) => vec![kind],
        None => EngineKind::ALL.to_vec(),
    };

    println!("Available Engines\n");
    for kind in kinds {
        println!("  {:<10} {}", kind.name(), kind.description());
        println!("    presets:    {}", kind.preset_names().join(", "));
        for (label, values) in details(kind) {
            println!("    {label:<11} {}", values.join(", "));
        }
        println!();
    }
    Ok(())
}

fn details(kind: EngineKind) -> Vec<(&'static str, Vec<String>)> {
    match kind {
        EngineKind::Additive => vec![],
        EngineKind::Granular => vec![
            (
                "windows:",
                WindowShape::TABLED
                    .iter()
                    .chain(&[WindowShape::Random])
                    .map(|w| w.name().to_string())
                    .collect(),
            ),
            (
                "modes:",
                SchedulingMode::ALL.iter().map(|m| m.name().to_string()).collect(),
            ),
        ],
        EngineKind::Fm => vec![(
            "algorithms:",
            ALGORITHMS
                .iter()
                .enumerate()
                .map(|(i, a)| format!("{} ({} carriers)", i + 1, a.carrier_count()))
                .collect(),
        )],
        EngineKind::Vector => vec![(
            "waveforms:",
            SourceWaveform::ALL.iter().map(|w| w.name().to_string()).collect(),
        )],
        EngineKind::Physical => vec![
            (
                "models:",
                PhysicalModel::ALL.iter().map(|m| m.name().to_string()).collect(),
            ),
            (
                "excitations:",
                Excitation::ALL.iter().map(|e| e.name().to_string()).collect(),
            ),
            (
                "bodies:",
                BodyProfile::ALL.iter().map(|b| b.name().to_string()).collect(),
            ),
        ],
    }
}
