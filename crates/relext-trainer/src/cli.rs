//! Command-line surface of the `train` binary.

use std::path::PathBuf;

use clap::Parser;
use relext_core::{Config, Result};

/// Train or evaluate the CNN relation classifier.
///
/// Settings start from the defaults (or from `--config`), then every flag
/// given on the command line or through its environment variable
/// overrides the corresponding value.
#[derive(Debug, Parser)]
#[command(name = "train")]
#[command(about = "Train or evaluate the CNN relation classifier")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "RELEXT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory containing the corpora and embeddings
    #[arg(long, env = "RELEXT_DATA_PATH")]
    pub data_path: Option<PathBuf>,

    /// Training corpus, relative to the data path
    #[arg(long, env = "RELEXT_TRAIN_FILE")]
    pub train_file: Option<PathBuf>,

    /// Test corpus, relative to the data path
    #[arg(long, env = "RELEXT_TEST_FILE")]
    pub test_file: Option<PathBuf>,

    /// Pretrained embedding vectors, relative to the data path
    #[arg(long, env = "RELEXT_EMBEDDING_FILE")]
    pub embedding_file: Option<PathBuf>,

    /// Token list aligned with the embedding vectors
    #[arg(long, env = "RELEXT_EMBEDDING_VOCAB", conflicts_with = "inline_embeddings")]
    pub embedding_vocab: Option<PathBuf>,

    /// The embedding file carries its tokens in the first column
    #[arg(long)]
    pub inline_embeddings: bool,

    /// Checkpoint directory
    #[arg(short, long, env = "RELEXT_SAVE_PATH")]
    pub save_path: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "RELEXT_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, env = "RELEXT_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    #[arg(short = 'e', long, env = "RELEXT_NUM_EPOCHS")]
    pub num_epochs: Option<usize>,

    /// Restore the checkpoint and run a single evaluation pass
    #[arg(long, env = "RELEXT_TEST_ONLY")]
    pub test_only: bool,

    /// Suppress per-step progress lines
    #[arg(short, long)]
    pub quiet: bool,

    /// Clamp for relative entity distances
    #[arg(long, env = "RELEXT_MAX_DISTANCE")]
    pub max_distance: Option<usize>,

    #[arg(long, env = "RELEXT_EMBEDDING_DIM")]
    pub embedding_dim: Option<usize>,

    #[arg(long, env = "RELEXT_NUM_RELATIONS")]
    pub num_relations: Option<usize>,

    #[arg(long, env = "RELEXT_LEARNING_RATE")]
    pub learning_rate: Option<f64>,

    #[arg(long, env = "RELEXT_SEED")]
    pub seed: Option<u64>,
}

impl Cli {
    /// Build the run configuration. Nothing is validated here.
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    config.$field = value;
                })*
            };
        }
        overlay!(
            data_path,
            train_file,
            test_file,
            embedding_file,
            save_path,
            batch_size,
            num_epochs,
            max_distance,
            embedding_dim,
            num_relations,
            learning_rate,
            seed,
        );

        if self.inline_embeddings {
            config.embedding_vocab = None;
        } else if self.embedding_vocab.is_some() {
            config.embedding_vocab = self.embedding_vocab;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file;
        }
        if self.test_only {
            config.test_only = true;
        }
        if self.quiet {
            config.verbose = false;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_flags() {
        let cli = Cli::try_parse_from(["train"]).unwrap();
        assert_eq!(cli.into_config().unwrap(), Config::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "train",
            "--batch-size",
            "16",
            "-e",
            "3",
            "--test-only",
            "--quiet",
            "--inline-embeddings",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.batch_size, 16);
        assert_eq!(config.num_epochs, 3);
        assert!(config.test_only);
        assert!(!config.verbose);
        assert!(config.embedding_vocab.is_none());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"batch_size": 8, "num_epochs": 7}"#).unwrap();

        let cli = Cli::try_parse_from([
            "train",
            "--config",
            path.to_str().unwrap(),
            "--num-epochs",
            "2",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.batch_size, 8);
        assert_eq!(config.num_epochs, 2);
    }

    #[test]
    fn test_vocab_and_inline_conflict() {
        let res = Cli::try_parse_from([
            "train",
            "--embedding-vocab",
            "words.lst",
            "--inline-embeddings",
        ]);
        assert!(res.is_err());
    }
}
