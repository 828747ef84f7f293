//! Default configuration output.

use anyhow::Context;
use clap::Args;
use resona_config::{EngineConfig, EngineKind};
use std::path::PathBuf;

use super::common::parse_engine;

#[derive(Args)]
pub struct ConfigArgs {
    /// Engine to configure
    #[arg(short, long, value_parser = parse_engine, default_value = "fm")]
    engine: EngineKind,

    /// Start from this preset instead of the engine's first one
    #[arg(short, long)]
    preset: Option<String>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Run the config command.
pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let mut cfg = EngineConfig::for_engine(args.engine);
    if let Some(preset) = args.preset {
        // Drop the spelled-out tables: they describe the default preset.
        cfg = EngineConfig::new(args.engine).with_preset(preset);
    }
    cfg.validate()?;

    match args.output {
        Some(path) => {
            cfg.save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "config written");
            println!("Wrote {} configuration to {}", cfg.engine, path.display());
        }
        None => print!("{}", cfg.to_toml_string()?),
    }
    Ok(())
}
