//! # Relext Core
//!
//! Data pipeline and epoch loop for classifying the semantic relation
//! between two marked entities in a sentence: vocabulary building,
//! pretrained embedding lookup, vectorization with entity distance
//! features, shuffled batching, and a CNN classifier on candle.
//!
//! ## Quick Start
//!
//! ```rust
//! use relext_core::{BatchIter, Vectorizer, Vocabulary, read_corpus};
//!
//! let raw = read_corpus("3 0 0 2 2 the cat sat\n".as_bytes(), "inline").unwrap();
//! let vocab = Vocabulary::build(&raw.sentences);
//! let data = Vectorizer::new(&vocab, 5, 10).vectorize(&raw, "inline").unwrap();
//!
//! let batches: Vec<_> = BatchIter::sequential(&data, 2).collect();
//! assert_eq!(batches.len(), 1);
//! assert_eq!(data.records()[0].dist2, vec![8, 9, 10, 11, 12]);
//! ```
pub mod batch;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod metrics;
pub mod model;
pub mod runner;
pub mod vectorize;
pub mod vocab;

// Re-export primary API
pub use batch::{Batch, BatchInputs, BatchIter};
pub use config::Config;
pub use corpus::{EntitySpan, RawDataset, load_corpus, read_corpus};
pub use embedding::{Coverage, EmbeddingMatrix, PretrainedTable, build_matrix, load_pretrained};
pub use error::{RelextError, Result};
pub use metrics::{EpochMetrics, macro_f1};
pub use model::{CnnConfig, CnnModel, RelationModel, SharedParams, StepOutput};
pub use runner::{EpochRunner, Mode};
pub use vectorize::{Dataset, Record, Vectorizer, distance};
pub use vocab::{PAD_ID, UNK_ID, Vocabulary};
