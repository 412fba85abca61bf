//! # Vectorizer
//!
//! Turns raw sentences into fixed-length id sequences plus per-token
//! distance features relative to each entity.

use crate::corpus::RawDataset;
use crate::error::{RelextError, Result};
use crate::vocab::{PAD_ID, Vocabulary};

/// One vectorized example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Token ids, padded or truncated to the dataset's sequence length.
    pub sentence_ids: Vec<u32>,
    pub relation: u32,
    /// Entity positions as annotated; may lie beyond the truncation point.
    pub e1: usize,
    pub e2: usize,
    /// Shifted, clamped offset of every position to `e1`.
    pub dist1: Vec<u32>,
    /// Shifted, clamped offset of every position to `e2`.
    pub dist2: Vec<u32>,
}

/// Vectorized examples sharing one sequence length.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataset {
    records: Vec<Record>,
    seq_len: usize,
}

impl Dataset {
    pub fn new(records: Vec<Record>, seq_len: usize) -> Self {
        Self { records, seq_len }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Relative offset of `position` to `entity`, clamped to
/// `[-max_distance, max_distance]` and shifted into `[0, 2 * max_distance]`.
pub fn distance(position: usize, entity: usize, max_distance: usize) -> u32 {
    let wide = |v: usize| i64::try_from(v).unwrap_or(i64::MAX);
    let max = wide(max_distance);
    let offset = wide(position).saturating_sub(wide(entity)).clamp(-max, max);
    u32::try_from(offset.saturating_add(max)).unwrap_or(u32::MAX)
}

/// Converts [`RawDataset`]s into [`Dataset`]s of a fixed length.
#[derive(Debug, Clone)]
pub struct Vectorizer<'a> {
    vocab: &'a Vocabulary,
    seq_len: usize,
    max_distance: usize,
    num_relations: Option<u32>,
}

impl<'a> Vectorizer<'a> {
    pub fn new(vocab: &'a Vocabulary, seq_len: usize, max_distance: usize) -> Self {
        Self {
            vocab,
            seq_len,
            max_distance,
            num_relations: None,
        }
    }

    /// Reject relation labels `>= num_relations`.
    #[must_use]
    pub fn with_num_relations(mut self, num_relations: usize) -> Self {
        self.num_relations = Some(num_relations as u32);
        self
    }

    /// Vectorize every example. `source_name` labels errors.
    pub fn vectorize(&self, raw: &RawDataset, source_name: &str) -> Result<Dataset> {
        let n = raw.sentences.len();
        if raw.relations.len() != n || raw.e1.len() != n || raw.e2.len() != n {
            return Err(RelextError::data_format(
                source_name,
                0,
                format!(
                    "field counts differ: {n} sentences, {} relations, {} e1, {} e2",
                    raw.relations.len(),
                    raw.e1.len(),
                    raw.e2.len()
                ),
            ));
        }

        let records = raw
            .sentences
            .iter()
            .enumerate()
            .map(|(i, sentence)| {
                let relation = raw.relations[i];
                match self.num_relations {
                    Some(limit) if relation >= limit => {
                        return Err(RelextError::data_format(
                            source_name,
                            i + 1,
                            format!("relation {relation} out of range (num_relations = {limit})"),
                        ));
                    }
                    _ => {}
                }
                Ok(self.record(sentence, relation, raw.e1[i].head(), raw.e2[i].head()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Dataset::new(records, self.seq_len))
    }

    /// Vectorize a single sentence.
    pub fn record(&self, sentence: &[String], relation: u32, e1: usize, e2: usize) -> Record {
        let mut sentence_ids: Vec<u32> = sentence
            .iter()
            .take(self.seq_len)
            .map(|token| self.vocab.id(token))
            .collect();
        sentence_ids.resize(self.seq_len, PAD_ID);

        let dist = |entity: usize| -> Vec<u32> {
            (0..self.seq_len)
                .map(|i| distance(i, entity, self.max_distance))
                .collect()
        };

        Record {
            sentence_ids,
            relation,
            e1,
            e2,
            dist1: dist(e1),
            dist2: dist(e2),
        }
    }
}
