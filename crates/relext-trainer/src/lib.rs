//! # Relext Trainer
//!
//! Command-line driver around `relext-core`: parses settings, installs
//! logging, runs the train/evaluate pipeline and persists checkpoints.

pub mod checkpoint;
pub mod cli;
pub mod driver;
pub mod logging;

pub use cli::Cli;
pub use driver::{Driver, EpochReport, RunSummary, Stage, run_training};
