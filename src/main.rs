//! climcomp CLI entrypoint.
//!
//! Provides a thin wrapper over the `cli` module: parse args, run the pipeline,
//! and exit with a status reflecting the outcome (0 success, 1 partial failure,
//! 2 startup error). For programmatic use, prefer the library API (`climcomp::api`).
use std::process::ExitCode;

use clap::Parser;

mod cli;

fn main() -> ExitCode {
    // Credentials and defaults may come from a local .env
    dotenv::dotenv().ok();
    let args = cli::CliArgs::parse();
    cli::run(args)
}
