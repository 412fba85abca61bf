//! # Driver
//!
//! Runs the whole pipeline in order: load corpora, build the vocabulary,
//! map pretrained embeddings, vectorize, then either train for the
//! configured number of epochs and save, or restore and evaluate once.
//! Any stage failure aborts the run.

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use candle_core::Device;
use oorandom::{Rand32, Rand64};
use relext_core::{
    BatchIter, CnnConfig, CnnModel, Config, Dataset, EpochMetrics, EpochRunner,
    Mode, SharedParams, Vectorizer, Vocabulary, build_matrix, load_corpus, load_pretrained,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::checkpoint::{self, CheckpointMeta};
use crate::logging;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    DataLoading,
    VocabBuild,
    EmbeddingLoad,
    Vectorize,
    TrainLoop,
    Evaluate,
    Save,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::DataLoading => "data loading",
            Stage::VocabBuild => "vocabulary build",
            Stage::EmbeddingLoad => "embedding load",
            Stage::Vectorize => "vectorization",
            Stage::TrainLoop => "training",
            Stage::Evaluate => "evaluation",
            Stage::Save => "checkpoint save",
        };
        f.write_str(name)
    }
}

/// Run `f` as `stage`, logging and tagging its failure.
fn stage<T>(stage: Stage, f: impl FnOnce() -> relext_core::Result<T>) -> Result<T> {
    info!("stage: {stage}");
    f().map_err(|e| {
        error!("{stage} failed: {e}");
        anyhow::Error::new(e).context(format!("{stage} failed"))
    })
}

/// Metrics of one training epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub train: EpochMetrics,
    pub test: EpochMetrics,
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Empty for evaluation-only runs.
    pub epochs: Vec<EpochReport>,
    /// Metrics of the last pass over the test corpus.
    pub test: EpochMetrics,
    /// Written checkpoint, `None` for evaluation-only runs.
    pub checkpoint: Option<PathBuf>,
}

struct Prepared {
    vocab: Vocabulary,
    params: SharedParams,
    train: Dataset,
    test: Dataset,
}

/// Owns the resolved configuration for one run.
pub struct Driver {
    config: Config,
}

impl Driver {
    /// Resolve corpus paths against `data_path` and validate the settings.
    pub fn new(config: Config) -> Result<Self> {
        let config = config.resolved();
        stage(Stage::Init, || config.validate())?;
        logging::log_config(&config);
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute the run to completion.
    pub fn run(&self) -> Result<RunSummary> {
        let prepared = self.prepare()?;
        let cnn = CnnConfig::from_config(&self.config, prepared.vocab.len());

        if self.config.test_only {
            self.evaluate_only(&prepared, &cnn)
        } else {
            self.train(&prepared, &cnn)
        }
    }

    fn prepare(&self) -> Result<Prepared> {
        let cfg = &self.config;

        let (train_raw, test_raw) = stage(Stage::DataLoading, || {
            Ok((load_corpus(&cfg.train_file)?, load_corpus(&cfg.test_file)?))
        })?;
        info!("train data: {}", train_raw.len());
        info!("test data: {}", test_raw.len());
        if train_raw.is_empty() && !cfg.test_only {
            warn!("training corpus {} is empty", cfg.train_file.display());
        }

        let vocab = stage(Stage::VocabBuild, || {
            Ok(Vocabulary::build(
                train_raw.sentences.iter().chain(&test_raw.sentences),
            ))
        })?;
        info!("total words: {}", vocab.len());

        let params = stage(Stage::EmbeddingLoad, || {
            let table = load_pretrained(
                &cfg.embedding_file,
                cfg.embedding_vocab.as_deref(),
                cfg.embedding_dim,
            )?;
            let mut rng = Rand32::new(cfg.seed);
            let (matrix, _) = build_matrix(&vocab, &table, cfg.embedding_dim, &mut rng)?;
            SharedParams::with_embeddings(&matrix, Device::Cpu)
        })?;

        let (train, test) = stage(Stage::Vectorize, || {
            let max_len = train_raw.max_sentence_len().max(test_raw.max_sentence_len());
            info!("max sentence length: {max_len}");
            let vectorizer = Vectorizer::new(&vocab, max_len, cfg.max_distance)
                .with_num_relations(cfg.num_relations);
            Ok((
                vectorizer.vectorize(&train_raw, &cfg.train_file.display().to_string())?,
                vectorizer.vectorize(&test_raw, &cfg.test_file.display().to_string())?,
            ))
        })?;

        Ok(Prepared {
            vocab,
            params,
            train,
            test,
        })
    }

    fn train(&self, data: &Prepared, cnn: &CnnConfig) -> Result<RunSummary> {
        let cfg = &self.config;
        let params = &data.params;
        let bz = cfg.batch_size;

        let (epochs, global_step) = stage(Stage::TrainLoop, || {
            let mut m_train = CnnModel::training(params, cnn)?;
            let mut m_test = CnnModel::inference(params, cnn)?;

            let train_runner = EpochRunner::new(bz, cfg.verbose);
            let test_runner = EpochRunner::new(bz, false);
            let mut rng = Rand64::new(u128::from(cfg.seed));
            let mut epochs = Vec::with_capacity(cfg.num_epochs);

            for epoch in 1..=cfg.num_epochs {
                let train_iter = BatchIter::shuffled(&data.train, bz, &mut rng);
                let train = train_runner.run(&mut m_train, train_iter, Mode::Train)?;
                let test_iter = BatchIter::sequential(&data.test, bz);
                let test = test_runner.run(&mut m_test, test_iter, Mode::Eval)?;

                info!(
                    "Epoch: {}, Train acc: {:.2}%, Test acc: {:.2}%, Train f1: {:.2}%, Test f1: {:.2}%",
                    epoch,
                    train.accuracy * 100.0,
                    test.accuracy * 100.0,
                    train.f1 * 100.0,
                    test.f1 * 100.0
                );
                epochs.push(EpochReport { epoch, train, test });
            }

            Ok((epochs, m_train.global_step()))
        })?;

        let meta = CheckpointMeta::new(cfg, data.vocab.len(), global_step);
        let path = stage(Stage::Save, || checkpoint::save(params, &cfg.save_path, &meta))?;

        Ok(RunSummary {
            test: epochs.last().map(|r| r.test).unwrap_or_default(),
            epochs,
            checkpoint: Some(path),
        })
    }

    fn evaluate_only(&self, data: &Prepared, cnn: &CnnConfig) -> Result<RunSummary> {
        let cfg = &self.config;
        let params = &data.params;

        let test = stage(Stage::Evaluate, || {
            let mut model = CnnModel::inference(params, cnn)?;
            let expected = CheckpointMeta::new(cfg, data.vocab.len(), 0);
            checkpoint::restore(params, &cfg.save_path, &expected)?;

            let runner = EpochRunner::new(cfg.batch_size, false);
            runner.run(
                &mut model,
                BatchIter::sequential(&data.test, cfg.batch_size),
                Mode::Eval,
            )
        })?;

        println!("test acc: {:.3}, test f1: {:.3}", test.accuracy, test.f1);
        info!("test acc: {:.3}, test f1: {:.3}", test.accuracy, test.f1);

        Ok(RunSummary {
            epochs: Vec::new(),
            test,
            checkpoint: None,
        })
    }
}

/// Build a [`Driver`] for `config` and run it.
pub fn run_training(config: Config) -> Result<RunSummary> {
    Driver::new(config)?.run()
}
