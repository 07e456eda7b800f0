#![doc = include_str!("../README.md")]

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

/// Exit status when the property does not hold.
const EXIT_VIOLATED: u8 = 2;

fn main() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = commands::run(&cli)?;
    print!("{}", outcome.render(cli.json)?);
    if cli.json {
        println!();
    }

    Ok(if outcome.all_verified() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_VIOLATED)
    })
}
