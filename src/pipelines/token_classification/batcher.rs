use std::collections::BTreeMap;

use burn::{
    data::dataloader,
    tensor::{backend::Backend, Int, Tensor},
};
use derive_new::new;
use rand::{rngs::StdRng, seq::SliceRandom};

use crate::{mappings::Mapping, utils::tensors};

use super::{Indexed, SentenceRecord};

/// Padded character indexes of every word in a batch
#[derive(Clone, Debug)]
pub struct Characters<B: Backend> {
    /// Characters left-aligned: `[batch_size * seq_length, max_chars]`
    pub forward: Tensor<B, 2, Int>,

    /// Characters of each word reversed, still left-aligned
    pub backward: Tensor<B, 2, Int>,

    /// One-hot over each word's last character, all zeros for empty words
    pub last: Tensor<B, 2>,
}

/// Model input for a bucket of sentences
#[derive(Clone, Debug)]
pub struct Batch<B: Backend> {
    /// Positions of the sentences in the caller's input
    pub indices: Vec<usize>,

    /// True token count of every sentence
    pub lengths: Vec<usize>,

    /// Token indexes: `[batch_size, seq_length]`
    pub tokens: Tensor<B, 2, Int>,

    /// Casing indexes: `[batch_size, seq_length]`
    pub casing: Tensor<B, 2, Int>,

    /// Character indexes, when the model reads characters
    pub characters: Option<Characters<B>>,

    /// Per-sentence permutation reversing the real positions: `[batch_size, seq_length, seq_length]`
    pub reverse: Tensor<B, 3>,

    /// 1.0 at real positions not holding the PADDING token: `[batch_size, seq_length]`
    pub mask: Tensor<B, 2>,
}

/// A training batch for one dataset head
#[derive(Clone, Debug, new)]
pub struct Train<B: Backend> {
    /// Output head of the dataset
    pub head: usize,

    /// Model input
    pub input: Batch<B>,

    /// Gold label ids, 0 where no label applies
    pub targets: Tensor<B, 2, Int>,

    /// 1.0 for the positions that count towards the loss
    pub loss_mask: Tensor<B, 2>,

    /// Number of positions counting towards the loss
    pub positions: usize,
}

/// Resolves and truncates the characters of each word
#[derive(Clone, Debug, new)]
pub struct CharacterLookup {
    /// The `characters` mapping
    pub mapping: Mapping,

    /// Longer words keep this many leading characters
    pub max_length: usize,
}

impl CharacterLookup {
    /// Character indexes per token, from the record's characters or from its raw tokens
    pub fn words(&self, record: &SentenceRecord) -> Vec<Vec<usize>> {
        match &record.characters {
            Some(words) => words
                .iter()
                .map(|word| {
                    word.iter()
                        .take(self.max_length)
                        .map(|&c| self.mapping.clamp(c))
                        .collect()
                })
                .collect(),
            None => record
                .raw_tokens
                .iter()
                .map(|token| {
                    token
                        .chars()
                        .take(self.max_length)
                        .map(|c| self.mapping.index_or_unknown(c.encode_utf8(&mut [0; 4])))
                        .collect()
                })
                .collect(),
        }
    }
}

/// Pads buckets of sentences into model input
#[derive(Clone, new)]
pub struct TokenBatcher<B: Backend> {
    /// The `tokens` mapping
    tokens: Mapping,

    /// The `casing` mapping
    casing: Mapping,

    /// Character lookup, when the model reads characters
    characters: Option<CharacterLookup>,

    /// Target device
    device: B::Device,
}

impl<B: Backend> TokenBatcher<B> {
    fn characters(&self, items: &[Indexed], seq_length: usize) -> Option<Characters<B>> {
        let lookup = self.characters.as_ref()?;

        let sentences: Vec<_> = items.iter().map(|item| lookup.words(&item.record)).collect();

        let width = sentences
            .iter()
            .flatten()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(1);

        let words = items.len() * seq_length;
        let mut forward = Vec::with_capacity(words * width);
        let mut backward = Vec::with_capacity(words * width);
        let mut last = Vec::with_capacity(words * width);

        for sentence in &sentences {
            for position in 0..seq_length {
                let word = sentence.get(position).map_or(&[][..], Vec::as_slice);

                let padding = std::iter::repeat(0);
                forward.extend(word.iter().copied().chain(padding.clone()).take(width));
                backward.extend(word.iter().rev().copied().chain(padding).take(width));
                last.extend((0..width).map(|i| if i + 1 == word.len() { 1.0 } else { 0.0 }));
            }
        }

        Some(Characters {
            forward: tensors::from_indexes(forward, [words, width], &self.device),
            backward: tensors::from_indexes(backward, [words, width], &self.device),
            last: tensors::from_values(last, [words, width], &self.device),
        })
    }
}

/// Flips the first `length` positions of each sentence and leaves the padding in place
fn reversal<B: Backend>(lengths: &[usize], seq_length: usize, device: &B::Device) -> Tensor<B, 3> {
    let mut values = vec![0.0; lengths.len() * seq_length * seq_length];

    for (sentence, &length) in lengths.iter().enumerate() {
        let offset = sentence * seq_length * seq_length;

        for row in 0..seq_length {
            let column = if row < length { length - 1 - row } else { row };
            values[offset + row * seq_length + column] = 1.0;
        }
    }

    tensors::from_values(values, [lengths.len(), seq_length, seq_length], device)
}

/// Implement Batcher trait for TokenBatcher struct for inference
impl<B: Backend> dataloader::batcher::Batcher<Indexed, Batch<B>> for TokenBatcher<B> {
    /// Collects a bucket of sentences into a padded batch
    fn batch(&self, items: Vec<Indexed>) -> Batch<B> {
        let lengths: Vec<usize> = items.iter().map(|item| item.record.len()).collect();
        let seq_length = lengths.iter().copied().max().unwrap_or(0).max(1);

        let tokens = items
            .iter()
            .map(|item| {
                item.record
                    .tokens
                    .iter()
                    .map(|&index| self.tokens.clamp(index))
                    .collect()
            })
            .collect();

        let casing = items
            .iter()
            .map(|item| {
                item.record
                    .casing
                    .iter()
                    .map(|&index| self.casing.clamp(index))
                    .collect()
            })
            .collect();

        let mask = items
            .iter()
            .flat_map(|item| {
                (0..seq_length).map(move |i| match item.record.tokens.get(i) {
                    Some(&token) if token != 0 => 1.0,
                    _ => 0.0,
                })
            })
            .collect();

        Batch {
            characters: self.characters(&items, seq_length),
            indices: items.iter().map(|item| item.index).collect(),
            tokens: tensors::pad_to(0, tokens, seq_length, &self.device),
            casing: tensors::pad_to(0, casing, seq_length, &self.device),
            reverse: reversal(&lengths, seq_length, &self.device),
            mask: tensors::from_values(mask, [items.len(), seq_length], &self.device),
            lengths,
        }
    }
}

/// Adds one dataset's targets to the padded batches
#[derive(Clone, new)]
pub struct TrainBatcher<B: Backend> {
    /// Pads the model input
    batcher: TokenBatcher<B>,

    /// Output head of the dataset
    head: usize,

    /// Label column of the dataset
    column: String,

    /// Label-space size of the head
    n_classes: usize,
}

/// Implement Batcher trait for TrainBatcher struct for training
impl<B: Backend> dataloader::batcher::Batcher<Indexed, Train<B>> for TrainBatcher<B> {
    /// Collects a bucket of labelled sentences into a training batch
    fn batch(&self, items: Vec<Indexed>) -> Train<B> {
        let batch_size = items.len();
        let mut targets = Vec::new();
        let mut loss_mask = Vec::new();

        let labelled: Vec<_> = items
            .iter()
            .map(|item| (&item.record.tokens, item.record.labels(&self.column)))
            .collect();

        let seq_length = items
            .iter()
            .map(|item| item.record.len())
            .max()
            .unwrap_or(0)
            .max(1);

        for (tokens, labels) in labelled {
            for position in 0..seq_length {
                let label = labels
                    .and_then(|labels| labels.get(position))
                    .copied()
                    .filter(|&label| label < self.n_classes)
                    .filter(|_| tokens.get(position).is_some_and(|&token| token != 0));

                targets.push(label.unwrap_or(0));
                loss_mask.push(if label.is_some() { 1.0 } else { 0.0 });
            }
        }

        let positions = loss_mask.iter().filter(|&&weight| weight > 0.0).count();
        let device = &self.batcher.device;

        Train {
            head: self.head,
            targets: tensors::from_indexes(targets, [batch_size, seq_length], device),
            loss_mask: tensors::from_values(loss_mask, [batch_size, seq_length], device),
            positions,
            input: self.batcher.batch(items),
        }
    }
}

/// Group sentence indexes into batches of equal length
///
/// Sentences are grouped by exact token count in ascending length order, each group keeping
/// input order unless an rng shuffles it, and groups are sliced into batches of at most
/// `batch_size`. Zero-length sentences are left out. Every other index appears exactly once.
pub fn bucket_by_length(
    lengths: &[usize],
    batch_size: usize,
    rng: Option<&mut StdRng>,
) -> Vec<Vec<usize>> {
    let mut buckets: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

    for (index, &length) in lengths.iter().enumerate() {
        if length > 0 {
            buckets.entry(length).or_default().push(index);
        }
    }

    let batch_size = batch_size.max(1);
    let mut rng = rng;

    buckets
        .into_values()
        .flat_map(|mut bucket| {
            if let Some(rng) = rng.as_deref_mut() {
                bucket.shuffle(rng);
            }

            bucket
                .chunks(batch_size)
                .map(<[usize]>::to_vec)
                .collect::<Vec<_>>()
        })
        .collect()
}
