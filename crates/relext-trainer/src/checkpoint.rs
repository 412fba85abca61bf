//! Checkpoint persistence.
//!
//! A checkpoint is the safetensors dump of [`SharedParams`] plus a small
//! JSON sidecar describing the shapes it was trained with.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use relext_core::config::CHECKPOINT_FILE;
use relext_core::{Config, RelextError, Result, SharedParams};
use serde::{Deserialize, Serialize};
use tracing::info;

const META_FILE: &str = "checkpoint.json";

/// Shapes and progress recorded next to the weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub global_step: usize,
    pub vocab_size: usize,
    pub embedding_dim: usize,
    pub num_relations: usize,
}

impl CheckpointMeta {
    pub fn new(config: &Config, vocab_size: usize, global_step: usize) -> Self {
        Self {
            global_step,
            vocab_size,
            embedding_dim: config.embedding_dim,
            num_relations: config.num_relations,
        }
    }
}

/// Write the checkpoint into `dir`. The weights are written to a temporary
/// file first so an interrupted save never leaves a truncated checkpoint.
pub fn save(params: &SharedParams, dir: &Path, meta: &CheckpointMeta) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let path = dir.join(CHECKPOINT_FILE);
    let tmp = dir.join(format!("{CHECKPOINT_FILE}.tmp"));
    params.save(&tmp)?;
    fs::rename(&tmp, &path)?;

    let json = serde_json::to_string_pretty(meta)
        .map_err(|e| RelextError::Checkpoint(e.to_string()))?;
    fs::write(dir.join(META_FILE), json)?;

    info!("Model saved to {:?} (global step {})", path, meta.global_step);
    Ok(path)
}

/// Restore weights from `dir` into `params`. `expected` must match the
/// recorded shapes when a sidecar is present.
pub fn restore(params: &SharedParams, dir: &Path, expected: &CheckpointMeta) -> Result<CheckpointMeta> {
    let path = dir.join(CHECKPOINT_FILE);
    if !path.exists() {
        return Err(RelextError::Configuration(format!(
            "no checkpoint found at {}",
            path.display()
        )));
    }

    let meta = match fs::read_to_string(dir.join(META_FILE)) {
        Ok(json) => {
            let meta: CheckpointMeta = serde_json::from_str(&json)
                .map_err(|e| RelextError::Checkpoint(format!("invalid {META_FILE}: {e}")))?;
            if (meta.vocab_size, meta.embedding_dim, meta.num_relations)
                != (expected.vocab_size, expected.embedding_dim, expected.num_relations)
            {
                return Err(RelextError::Configuration(format!(
                    "checkpoint was trained with vocab {} x {} and {} relations, \
                     current run has vocab {} x {} and {} relations",
                    meta.vocab_size,
                    meta.embedding_dim,
                    meta.num_relations,
                    expected.vocab_size,
                    expected.embedding_dim,
                    expected.num_relations
                )));
            }
            meta
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => expected.clone(),
        Err(e) => {
            return Err(RelextError::Checkpoint(format!(
                "cannot read {META_FILE}: {e}"
            )));
        }
    };

    params.load(&path)?;
    info!("Model restored from {:?} (global step {})", path, meta.global_step);
    Ok(meta)
}
