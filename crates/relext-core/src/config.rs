//! # Run Configuration
//!
//! One immutable settings struct, built once at startup and handed by
//! reference to every component.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RelextError, Result};

/// File name of the parameter checkpoint inside `save_path`.
pub const CHECKPOINT_FILE: &str = "model.safetensors";

/// Settings for one training or evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory that relative corpus and embedding paths are resolved against.
    pub data_path: PathBuf,
    pub train_file: PathBuf,
    pub test_file: PathBuf,
    /// Pretrained vectors, one per line.
    pub embedding_file: PathBuf,
    /// Token list aligned with `embedding_file`. When absent the vector file
    /// carries the token as its first column.
    pub embedding_vocab: Option<PathBuf>,
    /// Directory the checkpoint is written to and restored from.
    pub save_path: PathBuf,
    /// Append logs here instead of stderr.
    pub log_file: Option<PathBuf>,

    pub batch_size: usize,
    pub num_epochs: usize,
    /// Skip training and run a single evaluation pass over the test corpus.
    pub test_only: bool,
    /// Emit a progress line every 10 training steps.
    pub verbose: bool,

    /// Relative distances are clamped to `[-max_distance, max_distance]`.
    pub max_distance: usize,
    pub embedding_dim: usize,
    pub pos_embedding_dim: usize,
    pub num_filters: usize,
    pub window_size: usize,
    pub num_relations: usize,

    pub learning_rate: f64,
    pub l2_lambda: f64,
    pub dropout: f32,
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            train_file: PathBuf::from("train.txt"),
            test_file: PathBuf::from("test.txt"),
            embedding_file: PathBuf::from("embedding/senna/embeddings.txt"),
            embedding_vocab: Some(PathBuf::from("embedding/senna/words.lst")),
            save_path: PathBuf::from("saved_models"),
            log_file: None,
            batch_size: 100,
            num_epochs: 50,
            test_only: false,
            verbose: true,
            max_distance: 60,
            embedding_dim: 50,
            pos_embedding_dim: 5,
            num_filters: 100,
            window_size: 3,
            num_relations: 19,
            learning_rate: 0.001,
            l2_lambda: 0.01,
            dropout: 0.5,
            seed: 42,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelextError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            RelextError::Configuration(format!("invalid config {}: {e}", path.display()))
        })
    }

    /// Returns a copy with corpus and embedding paths joined onto `data_path`.
    /// Absolute paths are left alone.
    #[must_use]
    pub fn resolved(&self) -> Self {
        let join = |p: &Path| self.data_path.join(p);
        Self {
            train_file: join(&self.train_file),
            test_file: join(&self.test_file),
            embedding_file: join(&self.embedding_file),
            embedding_vocab: self.embedding_vocab.as_deref().map(join),
            ..self.clone()
        }
    }

    /// Reject settings no component can work with.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(RelextError::Configuration(msg.to_string()));

        if self.batch_size == 0 {
            return bad("batch_size must be > 0");
        }
        if self.embedding_dim == 0 {
            return bad("embedding_dim must be > 0");
        }
        if self.num_relations == 0 {
            return bad("num_relations must be > 0");
        }
        if self.max_distance == 0 {
            return bad("max_distance must be > 0");
        }
        if self.num_filters == 0 || self.pos_embedding_dim == 0 {
            return bad("num_filters and pos_embedding_dim must be > 0");
        }
        if self.window_size == 0 || self.window_size % 2 == 0 {
            return bad("window_size must be odd");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return bad("dropout must lie in [0, 1)");
        }
        if self.learning_rate <= 0.0 {
            return bad("learning_rate must be > 0");
        }
        Ok(())
    }

    /// Number of rows in each distance embedding table.
    pub fn num_distances(&self) -> usize {
        2 * self.max_distance + 1
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.save_path.join(CHECKPOINT_FILE)
    }
}
