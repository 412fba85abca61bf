//! # Corpus Loading
//!
//! Reads relation-annotated sentences. One example per line:
//!
//! ```text
//! relation e1_start e1_end e2_start e2_end token token ...
//! ```
//!
//! Positions are 0-based token indices; the entity's last token stands for
//! the entity downstream.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{RelextError, Result};

/// Inclusive token span of an entity mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpan {
    pub start: usize,
    pub end: usize,
}

impl EntitySpan {
    /// Token index used as the entity's position.
    pub fn head(&self) -> usize {
        self.end
    }
}

/// Corpus before vectorization, kept as parallel fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
    pub sentences: Vec<Vec<String>>,
    pub relations: Vec<u32>,
    pub e1: Vec<EntitySpan>,
    pub e2: Vec<EntitySpan>,
}

impl RawDataset {
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Length of the longest sentence, 0 for an empty corpus.
    pub fn max_sentence_len(&self) -> usize {
        self.sentences.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn push(&mut self, sentence: Vec<String>, relation: u32, e1: EntitySpan, e2: EntitySpan) {
        self.sentences.push(sentence);
        self.relations.push(relation);
        self.e1.push(e1);
        self.e2.push(e2);
    }
}

/// Load a corpus file.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<RawDataset> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        RelextError::Configuration(format!("cannot open corpus {}: {e}", path.display()))
    })?;
    read_corpus(BufReader::new(file), &path.display().to_string())
}

/// Parse corpus lines from any reader. `source_name` labels errors.
pub fn read_corpus<R: BufRead>(reader: R, source_name: &str) -> Result<RawDataset> {
    let mut data = RawDataset::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let lineno = idx + 1;
        let fail = |reason: String| RelextError::data_format(source_name, lineno, reason);

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            return Err(fail(format!(
                "expected relation, four entity offsets and a sentence, got {} fields",
                parts.len()
            )));
        }

        let relation: u32 = parts[0]
            .parse()
            .map_err(|_| fail(format!("relation {:?} is not a non-negative integer", parts[0])))?;

        let mut offsets = [0usize; 4];
        for (slot, raw) in offsets.iter_mut().zip(&parts[1..5]) {
            *slot = raw
                .parse()
                .map_err(|_| fail(format!("entity offset {raw:?} is not a non-negative integer")))?;
        }

        let e1 = EntitySpan { start: offsets[0], end: offsets[1] };
        let e2 = EntitySpan { start: offsets[2], end: offsets[3] };
        if e1.start > e1.end || e2.start > e2.end {
            return Err(fail("entity span starts after it ends".into()));
        }

        let sentence = parts[5..].iter().map(|t| t.to_lowercase()).collect();
        data.push(sentence, relation, e1, e2);
    }

    Ok(data)
}
