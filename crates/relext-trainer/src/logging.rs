//! Log subscriber setup.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use relext_core::Config;
use tracing::{Level, info};

/// Install the global subscriber: stderr by default, or appended to
/// `config.log_file`. The save directory is created in the latter case.
pub fn init(config: &Config) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_target(false);

    let installed = match &config.log_file {
        Some(path) => {
            fs::create_dir_all(&config.save_path).with_context(|| {
                format!("cannot create save directory {}", config.save_path.display())
            })?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;

            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

/// Log every configuration key on its own line.
pub fn log_config(config: &Config) {
    let mut lines = String::from("\n");
    if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(config) {
        for (key, value) in map {
            lines.push_str(&format!("\t{key}:\t{value}\n"));
        }
    }
    info!("{lines}");
}
