//! Skinnydip CLI
//!
//! `skinnydip <FILE>` post-processes a sliced G-code file in place.
//! PrusaSlicer can run it automatically via
//! *Print Settings > Output options > Post-processing scripts*.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use skinnydip::{init_logging, Config, FileJob};

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATE"), ")");

#[derive(Parser, Debug)]
#[command(
    name = "skinnydip",
    about = "Skinnydip - MMU2 string eliminator for PrusaSlicer G-code",
    version,
    long_version = LONG_VERSION
)]
struct Cli {
    /// G-code file to process in place
    file: PathBuf,

    /// Keep the unprocessed file as <name>_original.<ext>
    #[arg(short, long)]
    keep: bool,

    /// Settings file (.toml or .json)
    #[arg(short, long, env = "SKINNYDIP_CONFIG")]
    config: Option<PathBuf>,

    /// Do not write the log file
    #[arg(long)]
    no_log: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if cli.keep {
        config.output.keep_original = true;
    }
    if cli.no_log {
        config.output.write_log = false;
    }

    let outcome = FileJob::new(config).run(&cli.file)?;
    let tallies = outcome.report.tallies;
    println!(
        "{}: {} dips, {} temperature changes inserted",
        outcome.paths.input.display(),
        tallies.thread_dip.inserted,
        tallies.temperature().inserted
    );
    for notice in &outcome.report.notices {
        println!("  notice: {}", notice);
    }
    if outcome.kept_original {
        println!("  original kept as {}", outcome.paths.backup.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{:#}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("skinnydip: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
