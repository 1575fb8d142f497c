// src/bin/warzone/app.rs
use std::io;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use log::LevelFilter;

use warzone::bench::{self, BenchConfig, Failures, Registry, RunParams};
use warzone::EngineKind;

#[derive(Parser)]
#[command(name = "warzone")]
#[command(about = "Micro-benchmarks for the warzone document store", long_about = None)]
pub struct Cli {
    /// Number of records to insert
    #[arg(short = 'n', long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    iterations: u64,

    /// Print the duration of every f-th insert (the first and last are always printed)
    #[arg(short = 'f', long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    frequency: u64,

    /// Scenario to run
    #[arg(short, long)]
    scenario: String,

    /// Storage engine
    #[arg(short, long, value_enum, default_value_t = EngineKind::Sled)]
    engine: EngineKind,

    /// Database location (defaults to <scenario>.db)
    #[arg(short, long)]
    dbname: Option<PathBuf>,

    /// Remove the database once the run is over
    #[arg(long)]
    rm: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Log filter implied by `-v` flags; `RUST_LOG` still wins
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn into_config(self) -> Result<BenchConfig> {
        Ok(BenchConfig {
            engine: self.engine,
            target: self.dbname,
            scenario: self.scenario,
            remove_after: self.rm,
            params: RunParams::new(self.iterations, self.frequency)?,
        })
    }
}

/// Run the benchmark described by the command line
pub fn run(cli: Cli) -> Result<Failures> {
    let registry = Registry::builtin();

    if registry.get(&cli.scenario).is_none() {
        eprintln!("Available scenarios are:");
        for name in registry.names() {
            eprintln!("- {}", name);
        }
        bail!("unknown scenario: {}", cli.scenario);
    }

    let config = cli.into_config()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    Ok(bench::execute(&config, &registry, &mut out))
}
