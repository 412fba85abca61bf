//! # Embedding Loader
//!
//! Maps a pretrained embedding table onto a [`Vocabulary`], producing one
//! dense row per vocabulary id. Two on-disk layouts are understood:
//!
//! - a vector file with one whitespace separated vector per line, aligned
//!   with a separate token list (one token per line);
//! - a single file of `token v1 v2 ... vD` lines, optionally headed by a
//!   `count dim` line.
//!
//! Tokens the table does not cover get small uniform random vectors so the
//! model can still adapt them. The padding row stays zero.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use oorandom::Rand32;
use tracing::{debug, info};

use crate::error::{RelextError, Result};
use crate::vocab::{PAD_ID, UNK_ID, Vocabulary};

/// OOV rows are sampled from `[-OOV_INIT_RANGE, OOV_INIT_RANGE)`.
pub const OOV_INIT_RANGE: f32 = 0.1;

/// Pretrained token vectors as read from disk.
#[derive(Debug, Clone, Default)]
pub struct PretrainedTable {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl PretrainedTable {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: HashMap::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<&[f32]> {
        self.vectors.get(token).map(Vec::as_slice)
    }

    /// First occurrence of a token wins.
    pub fn insert(&mut self, token: String, vector: Vec<f32>) {
        self.vectors.entry(token).or_insert(vector);
    }
}

/// Dense `(vocab_size, dim)` matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    pub fn row(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dim;
        &self.data[start..start + self.dim]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// How much of the vocabulary the pretrained table covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub pretrained: usize,
    pub random: usize,
}

/// Read a pretrained table from disk. `vocab_path` selects the two-file layout.
pub fn load_pretrained<P: AsRef<Path>>(
    vector_path: P,
    vocab_path: Option<&Path>,
    dim: usize,
) -> Result<PretrainedTable> {
    let vector_path = vector_path.as_ref();
    let vectors = open(vector_path)?;
    let name = vector_path.display().to_string();

    match vocab_path {
        Some(vocab_path) => {
            let tokens = open(vocab_path)?;
            read_aligned(vectors, tokens, dim, &name)
        }
        None => read_inline(vectors, dim, &name),
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        RelextError::Configuration(format!("cannot open embedding file {}: {e}", path.display()))
    })
}

/// Two-file layout: line `n` of `vectors` belongs to line `n` of `tokens`.
pub fn read_aligned<V: BufRead, T: BufRead>(
    vectors: V,
    tokens: T,
    dim: usize,
    source_name: &str,
) -> Result<PretrainedTable> {
    let mut table = PretrainedTable::new(dim);
    let mut vector_lines = vectors.lines();
    let mut lineno = 0;

    for token in tokens.lines() {
        let token = token?;
        lineno += 1;
        let vector = vector_lines.next().transpose()?.ok_or_else(|| {
            RelextError::data_format(source_name, lineno, "vector file is shorter than the token list")
        })?;
        let values = parse_vector(vector.split_whitespace(), dim, source_name, lineno)?;
        table.insert(token.trim().to_string(), values);
    }

    if vector_lines.next().transpose()?.is_some() {
        return Err(RelextError::data_format(
            source_name,
            lineno + 1,
            "vector file is longer than the token list",
        ));
    }

    Ok(table)
}

/// Single-file layout: `token v1 ... vD` per line.
pub fn read_inline<R: BufRead>(reader: R, dim: usize, source_name: &str) -> Result<PretrainedTable> {
    let mut table = PretrainedTable::new(dim);

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = idx + 1;
        let mut fields = line.split_whitespace();
        let Some(token) = fields.next() else {
            continue;
        };

        if lineno == 1 && is_header(&line, dim) {
            debug!("skipping embedding header: {}", line.trim());
            continue;
        }

        let values = parse_vector(fields, dim, source_name, lineno)?;
        table.insert(token.to_string(), values);
    }

    Ok(table)
}

fn is_header(line: &str, dim: usize) -> bool {
    let fields: Vec<&str> = line.split_whitespace().collect();
    dim != 1 && fields.len() == 2 && fields.iter().all(|f| f.parse::<usize>().is_ok())
}

fn parse_vector<'a, I: Iterator<Item = &'a str>>(
    fields: I,
    dim: usize,
    source_name: &str,
    lineno: usize,
) -> Result<Vec<f32>> {
    let values = fields
        .map(|f| {
            f.parse::<f32>().map_err(|_| {
                RelextError::data_format(source_name, lineno, format!("{f:?} is not a number"))
            })
        })
        .collect::<Result<Vec<f32>>>()?;

    if values.len() != dim {
        return Err(RelextError::Configuration(format!(
            "{source_name} line {lineno}: embedding width {} does not match embedding_dim {dim}",
            values.len()
        )));
    }
    Ok(values)
}

/// Build the embedding matrix for `vocab`.
///
/// Rows for tokens found in `pretrained` are copied verbatim; every other
/// row except padding is drawn from `rng`.
pub fn build_matrix(
    vocab: &Vocabulary,
    pretrained: &PretrainedTable,
    dim: usize,
    rng: &mut Rand32,
) -> Result<(EmbeddingMatrix, Coverage)> {
    if pretrained.dim() != dim {
        return Err(RelextError::Configuration(format!(
            "pretrained embeddings have dimension {}, model expects {dim}",
            pretrained.dim()
        )));
    }

    let mut data = Vec::with_capacity(vocab.len() * dim);
    let mut coverage = Coverage { pretrained: 0, random: 0 };

    for id in 0..vocab.len() as u32 {
        if id == PAD_ID {
            data.extend(std::iter::repeat_n(0.0, dim));
            continue;
        }

        let hit = if id == UNK_ID {
            None
        } else {
            vocab.token(id).and_then(|t| pretrained.get(t))
        };
        match hit {
            Some(vector) => {
                data.extend_from_slice(vector);
                coverage.pretrained += 1;
            }
            None => {
                data.extend((0..dim).map(|_| (rng.rand_float() * 2.0 - 1.0) * OOV_INIT_RANGE));
                coverage.random += 1;
            }
        }
    }

    info!(
        "embedding matrix: {} rows x {dim}, {} pretrained, {} random",
        vocab.len(),
        coverage.pretrained,
        coverage.random
    );

    Ok((EmbeddingMatrix { dim, data }, coverage))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab_of(tokens: &[&str]) -> Vocabulary {
        let sent: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        Vocabulary::build(std::iter::once(&sent))
    }

    #[test]
    fn test_pretrained_rows_copied_exactly() {
        let table = read_inline("cat 0.5 -0.25\ndog 1.0 2.0\n".as_bytes(), 2, "inline").unwrap();
        let vocab = vocab_of(&["cat", "bird", "dog"]);
        let mut rng = Rand32::new(7);

        let (matrix, coverage) = build_matrix(&vocab, &table, 2, &mut rng).unwrap();

        assert_eq!(matrix.rows(), vocab.len());
        assert_eq!(matrix.row(vocab.id("cat")), &[0.5, -0.25]);
        assert_eq!(matrix.row(vocab.id("dog")), &[1.0, 2.0]);
        assert_eq!(matrix.row(PAD_ID), &[0.0, 0.0]);
        assert_eq!(coverage, Coverage { pretrained: 2, random: 2 });
    }

    #[test]
    fn test_oov_rows_within_range() {
        let table = PretrainedTable::new(4);
        let vocab = vocab_of(&["a", "b", "c"]);
        let mut rng = Rand32::new(1);

        let (matrix, _) = build_matrix(&vocab, &table, 4, &mut rng).unwrap();
        for id in 1..vocab.len() as u32 {
            for &v in matrix.row(id) {
                assert!((-OOV_INIT_RANGE..OOV_INIT_RANGE).contains(&v));
            }
        }
    }

    #[test]
    fn test_same_seed_same_matrix() {
        let table = PretrainedTable::new(3);
        let vocab = vocab_of(&["x", "y"]);
        let (a, _) = build_matrix(&vocab, &table, 3, &mut Rand32::new(9)).unwrap();
        let (b, _) = build_matrix(&vocab, &table, 3, &mut Rand32::new(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_aligned_layout() {
        let vectors = "0.1 0.2\n0.3 0.4\n";
        let tokens = "the\nof\n";
        let table = read_aligned(vectors.as_bytes(), tokens.as_bytes(), 2, "emb").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("of"), Some(&[0.3, 0.4][..]));
    }

    #[test]
    fn test_aligned_length_mismatch() {
        let err = read_aligned("0.1 0.2\n".as_bytes(), "a\nb\n".as_bytes(), 2, "emb").unwrap_err();
        assert!(matches!(err, RelextError::DataFormat { line: 2, .. }));
    }

    #[test]
    fn test_width_mismatch_is_configuration_error() {
        let err = read_inline("cat 0.5 0.5 0.5\n".as_bytes(), 2, "emb").unwrap_err();
        assert!(matches!(err, RelextError::Configuration(_)));

        let table = PretrainedTable::new(3);
        let err = build_matrix(&vocab_of(&["a"]), &table, 2, &mut Rand32::new(0)).unwrap_err();
        assert!(matches!(err, RelextError::Configuration(_)));
    }

    #[test]
    fn test_word2vec_header_skipped() {
        let table = read_inline("2 3\na 1 2 3\nb 4 5 6\n".as_bytes(), 3, "w2v").unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get("2").is_none());
    }

    #[test]
    fn test_load_pretrained_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let vec_path = dir.path().join("vectors.txt");
        let vocab_path = dir.path().join("words.lst");
        std::fs::write(&vec_path, "1 1\n2 2\n").unwrap();
        std::fs::write(&vocab_path, "a\nb\n").unwrap();

        let table = load_pretrained(&vec_path, Some(vocab_path.as_path()), 2).unwrap();
        assert_eq!(table.get("b"), Some(&[2.0, 2.0][..]));

        let err = load_pretrained(dir.path().join("missing"), None, 2).unwrap_err();
        assert!(matches!(err, RelextError::Configuration(_)));
    }
}
