//! Command-line front end: named spacetime scenarios with the example
//! defaults, traced through `worldline_core` and exported as CSV.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{KerrArgs, MondArgs, SchwarzschildArgs, SitterArgs};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Trace geodesic orbits through curved spacetimes"
)]
struct Cli {
    /// Increase verbosity (-v prints the geodesic equations, -vv debugs the
    /// solver, -vvv traces every step)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Circular orbit or radial plunge in the Schwarzschild spacetime
    Schwarzschild(SchwarzschildArgs),

    /// Orbit around a rotating black hole (Boyer-Lindquist form)
    Kerr(KerrArgs),

    /// Orbit in the de Sitter-Schwarzschild spacetime with a cosmological
    /// constant
    Sitter(SitterArgs),

    /// Galactic orbit in a MOND-corrected metric
    Mond(MondArgs),
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    match &cli.command {
        Command::Schwarzschild(args) => commands::schwarzschild(args, cli.verbose),
        Command::Kerr(args) => commands::kerr(args, cli.verbose),
        Command::Sitter(args) => commands::sitter(args, cli.verbose),
        Command::Mond(args) => commands::mond(args, cli.verbose),
    }
}
