//! Pretrained embedding matrices aligned with a token mapping

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Result, TaggerError},
    mappings::{Mapping, PADDING, UNKNOWN_TOKEN},
    utils::tensors,
};

/// A dense `rows x dim` matrix, one row per mapping index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f32>>", into = "Vec<Vec<f32>>")]
pub struct EmbeddingMatrix {
    rows: usize,
    dim: usize,
    values: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Create a matrix from row-major values
    pub fn new(rows: usize, dim: usize, values: Vec<f32>) -> Result<Self> {
        if rows == 0 || dim == 0 {
            return Err(TaggerError::config(format!(
                "embedding matrix must not be empty (got {rows}x{dim})"
            )));
        }

        if values.len() != rows * dim {
            return Err(TaggerError::config(format!(
                "expected {} values for a {rows}x{dim} embedding matrix, got {}",
                rows * dim,
                values.len()
            )));
        }

        Ok(Self { rows, dim, values })
    }

    /// Create a matrix from a list of equally sized rows
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);

        if let Some(row) = rows.iter().position(|row| row.len() != dim) {
            return Err(TaggerError::config(format!(
                "embedding row {row} has {} values instead of {dim}",
                rows[row].len()
            )));
        }

        let count = rows.len();
        Self::new(count, dim, rows.into_iter().flatten().collect())
    }

    /// A random uniform matrix in `[-0.25, 0.25)` whose padding row is zero
    pub fn random<R: Rng>(rows: usize, dim: usize, rng: &mut R) -> Result<Self> {
        let values = (0..rows * dim)
            .map(|i| {
                if i < dim {
                    0.0
                } else {
                    rng.gen_range(-0.25..0.25)
                }
            })
            .collect();

        Self::new(rows, dim, values)
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Embedding dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// One row of the matrix
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        (index < self.rows).then(|| &self.values[index * self.dim..(index + 1) * self.dim])
    }

    /// Copy the matrix onto a device
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        tensors::from_values(self.values.clone(), [self.rows, self.dim], device)
    }
}

impl TryFrom<Vec<Vec<f32>>> for EmbeddingMatrix {
    type Error = TaggerError;

    fn try_from(rows: Vec<Vec<f32>>) -> Result<Self> {
        Self::from_rows(rows)
    }
}

impl From<EmbeddingMatrix> for Vec<Vec<f32>> {
    fn from(matrix: EmbeddingMatrix) -> Self {
        matrix
            .values
            .chunks(matrix.dim)
            .map(<[f32]>::to_vec)
            .collect()
    }
}

/// Load a word-vector text file (one `word v1 v2 ...` line per word)
///
/// Returns a token mapping with `PADDING` at 0 (zero row) and `UNKNOWN_TOKEN` at 1 (random
/// row), followed by the file's words in order. A leading `count dim` header line is skipped and
/// repeated words keep their first vector.
pub fn load_word_vectors<P: AsRef<Path>, R: Rng>(
    path: P,
    rng: &mut R,
) -> Result<(Mapping, EmbeddingMatrix)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)?;

    let mut words: Vec<(String, Vec<f32>)> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let mut fields = record.iter().filter(|field| !field.is_empty());

        let Some(word) = fields.next() else {
            continue;
        };

        let vector = fields
            .map(|value| {
                value.parse::<f32>().map_err(|e| {
                    TaggerError::config(format!("line {}: invalid value '{value}': {e}", line + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if line == 0 && vector.len() == 1 && word.parse::<usize>().is_ok() {
            continue;
        }

        if seen.insert(word.to_string()) {
            words.push((word.to_string(), vector));
        }
    }

    let dim = words.first().map_or(0, |(_, vector)| vector.len());
    if dim == 0 {
        return Err(TaggerError::config("word vector file contains no vectors"));
    }

    let unknown: Vec<f32> = (0..dim).map(|_| rng.gen_range(-0.25..0.25)).collect();

    let mut mapping = vec![(PADDING.to_string(), 0), (UNKNOWN_TOKEN.to_string(), 1)];
    let mut rows = vec![vec![0.0; dim], unknown];

    for (word, vector) in words {
        mapping.push((word, rows.len()));
        rows.push(vector);
    }

    log::info!(
        "Loaded {} word vectors of dimension {}",
        rows.len() - 2,
        dim
    );

    Ok((mapping.into_iter().collect(), EmbeddingMatrix::from_rows(rows)?))
}
