//! Resona CLI - render, inspect and benchmark the resona synthesis engines.

mod commands;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resona")]
#[command(author, version, about = "Resona polyphonic synthesis CLI", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List engines, presets and engine-specific options
    Engines(commands::engines::EnginesArgs),

    /// Render a note in memory and report level and pitch
    Analyze(commands::analyze::AnalyzeArgs),

    /// Measure the real-time factor of an engine
    Bench(commands::bench::BenchArgs),

    /// Print or write a default engine configuration
    Config(commands::config::ConfigArgs),
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Engines(args) => commands::engines::run(args),
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Bench(args) => commands::bench::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
