//! # Batch Iterator
//!
//! Lazy, single-pass batching over a [`Dataset`]. Every batch holds
//! `batch_size` records except possibly the last; the batch dimension is
//! never padded.

use oorandom::Rand64;

use crate::vectorize::{Dataset, Record};

/// Flattened model inputs for one batch.
///
/// Sequence fields are row-major `(batch_size, seq_len)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInputs {
    pub batch_size: usize,
    pub seq_len: usize,
    pub sentence_ids: Vec<u32>,
    pub entity1_pos: Vec<u32>,
    pub entity2_pos: Vec<u32>,
    pub distance1: Vec<u32>,
    pub distance2: Vec<u32>,
    pub label: Vec<u32>,
}

/// A slice of records produced by [`BatchIter`].
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    records: Vec<&'a Record>,
    seq_len: usize,
}

impl<'a> Batch<'a> {
    pub fn records(&self) -> &[&'a Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn labels(&self) -> Vec<u32> {
        self.records.iter().map(|r| r.relation).collect()
    }

    /// Assemble the parallel input fields the model consumes.
    pub fn inputs(&self) -> BatchInputs {
        let n = self.records.len();
        let cells = n * self.seq_len;
        let mut inputs = BatchInputs {
            batch_size: n,
            seq_len: self.seq_len,
            sentence_ids: Vec::with_capacity(cells),
            entity1_pos: Vec::with_capacity(n),
            entity2_pos: Vec::with_capacity(n),
            distance1: Vec::with_capacity(cells),
            distance2: Vec::with_capacity(cells),
            label: Vec::with_capacity(n),
        };

        for r in &self.records {
            inputs.sentence_ids.extend_from_slice(&r.sentence_ids);
            inputs.entity1_pos.push(u32::try_from(r.e1).unwrap_or(u32::MAX));
            inputs.entity2_pos.push(u32::try_from(r.e2).unwrap_or(u32::MAX));
            inputs.distance1.extend_from_slice(&r.dist1);
            inputs.distance2.extend_from_slice(&r.dist2);
            inputs.label.push(r.relation);
        }

        inputs
    }
}

/// Iterator over the batches of one epoch.
#[derive(Debug)]
pub struct BatchIter<'a> {
    dataset: &'a Dataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> BatchIter<'a> {
    /// Batches in dataset order.
    pub fn sequential(dataset: &'a Dataset, batch_size: usize) -> Self {
        Self::with_order(dataset, batch_size, (0..dataset.len()).collect())
    }

    /// Batches over a uniformly random permutation of the dataset.
    pub fn shuffled(dataset: &'a Dataset, batch_size: usize, rng: &mut Rand64) -> Self {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        // Fisher-Yates
        for i in (1..order.len()).rev() {
            let j = rng.rand_range(0..(i as u64 + 1)) as usize;
            order.swap(i, j);
        }
        Self::with_order(dataset, batch_size, order)
    }

    fn with_order(dataset: &'a Dataset, batch_size: usize, order: Vec<usize>) -> Self {
        debug_assert!(batch_size > 0, "batch_size must be > 0");
        Self {
            dataset,
            order,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    /// Number of batches not yet produced.
    pub fn remaining(&self) -> usize {
        (self.order.len() - self.cursor).div_ceil(self.batch_size)
    }
}

impl<'a> Iterator for BatchIter<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let records = self.order[self.cursor..end]
            .iter()
            .map(|&i| &self.dataset.records()[i])
            .collect();
        self.cursor = end;

        Some(Batch {
            records,
            seq_len: self.dataset.seq_len(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for BatchIter<'_> {}
