mod app;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::info;

fn main() -> ExitCode {
    let cli = app::Cli::parse();

    // Logs go to stderr, leaving stdout to the CSV series
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    info!("starting warzone");

    match app::run(cli) {
        Ok(failures) if failures.is_empty() => ExitCode::SUCCESS,
        Ok(failures) => {
            for failure in &failures {
                eprintln!("{} {}", "error:".red().bold(), failure);
            }
            ExitCode::FAILURE
        },
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        },
    }
}
