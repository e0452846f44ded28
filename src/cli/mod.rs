//! Command Line Interface (CLI) layer for climcomp.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`): loading configuration, running
//! the pipeline over a source directory and reporting the outcome. It wires
//! user-provided options to the library functionality exposed via
//! `climcomp::api`.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
