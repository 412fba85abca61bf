use clap::Parser;
use relext_trainer::{Cli, logging, run_training};
use tracing::error;

fn main() {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run_training(config) {
        error!("Run failed: {:#}", e);
        std::process::exit(1);
    }
}
