use std::{collections::BTreeMap, path::Path};

use burn::{
    config::Config as _,
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    errors::{Result, TaggerError},
    models::bilstm::{Model, ModelConfig},
    utils::{classes, files, tensors},
};

use super::{
    batcher::{bucket_by_length, Batch},
    output::Inference,
    training::{indexed, Vocabulary, MODEL_CONFIG_FILE, MODEL_FILE, TAGGER_CONFIG_FILE, VOCABULARY_FILE},
    SentenceRecord, Tagger, TaggerConfig,
};

/// Labels per dataset, one sequence per sentence in input order
pub type Labels = BTreeMap<String, Vec<Vec<String>>>;

/// Attention weights per dataset, one `length x width` matrix per sentence in input order
pub type Attention = BTreeMap<String, Vec<Vec<Vec<f32>>>>;

/// Result of [`Tagger::predict`]
#[derive(Clone, Debug, PartialEq)]
pub struct Predictions {
    /// Predicted labels
    pub labels: Labels,

    /// Pre-attention weights, when requested
    pub attention: Option<Attention>,
}

/// Argmax labels per head and sentence, cut to each sentence's length
struct Decoded {
    labels: Vec<Vec<Vec<usize>>>,
    attention: Option<Vec<Vec<Vec<f32>>>>,
}

/// Run one batch through the model and unpad its outputs
fn decode<B: Backend>(model: &Model<B>, batch: &Batch<B>, with_attention: bool) -> Decoded {
    let [batch_size, seq_length] = batch.tokens.dims();

    let Inference {
        probabilities,
        attention,
    } = model.infer(batch);

    let labels = probabilities
        .into_iter()
        .map(|probabilities| {
            let ids =
                tensors::to_indexes(probabilities.argmax(2).reshape([batch_size, seq_length]));

            ids.chunks(seq_length)
                .zip(&batch.lengths)
                .map(|(row, &length)| row[..length].to_vec())
                .collect()
        })
        .collect();

    let attention = attention.filter(|_| with_attention).map(|weights| {
        let [_, _, width] = weights.dims();
        let over_time = model.time_attention.is_some();
        let values = tensors::to_values(weights);

        values
            .chunks(seq_length * width)
            .zip(&batch.lengths)
            .map(|(sentence, &length)| {
                let columns = if over_time { length } else { width };

                sentence
                    .chunks(width)
                    .take(length)
                    .map(|row| row[..columns].to_vec())
                    .collect()
            })
            .collect()
    });

    Decoded { labels, attention }
}

/// Keep only the listed positions of a sequence
fn select<T: Clone>(values: &[T], positions: &[usize]) -> Vec<T> {
    positions
        .iter()
        .filter_map(|&position| values.get(position).cloned())
        .collect()
}

impl<B: AutodiffBackend> Tagger<B> {
    /// Predict labels, and optionally pre-attention weights, for every sentence
    ///
    /// Output sequences have one entry per non-padding token of their sentence, in input order;
    /// positions holding the PADDING token (index 0) are dropped from the labels and from both
    /// axes of time attention. Requesting attention never changes the labels.
    pub fn predict(&self, sentences: &[SentenceRecord], return_attention: bool) -> Result<Predictions> {
        let over_time = self
            .model
            .as_ref()
            .is_some_and(|model| model.time_attention.is_some());

        let (labels, attention) = self.decode_all(sentences, return_attention)?;

        let kept: Vec<Vec<usize>> = sentences
            .iter()
            .map(|sentence| {
                sentence
                    .tokens
                    .iter()
                    .enumerate()
                    .filter(|&(_, token)| *token != 0)
                    .map(|(position, _)| position)
                    .collect()
            })
            .collect();

        let labels = labels
            .into_iter()
            .map(|(name, sentences)| {
                let sentences = sentences
                    .iter()
                    .zip(&kept)
                    .map(|(labels, positions)| select(labels, positions))
                    .collect();

                (name, sentences)
            })
            .collect();

        let attention = attention.map(|attention| {
            let stripped: Vec<Vec<Vec<f32>>> = attention
                .iter()
                .zip(&kept)
                .map(|(rows, positions)| {
                    select(rows, positions)
                        .into_iter()
                        .map(|row| if over_time { select(&row, positions) } else { row })
                        .collect()
                })
                .collect();

            self.datasets
                .keys()
                .map(|name| (name.clone(), stripped.clone()))
                .collect()
        });

        Ok(Predictions { labels, attention })
    }

    /// Predict labels for every sentence, keyed by dataset name
    ///
    /// Unlike [`predict`](Tagger::predict), every token gets a label, PADDING included.
    pub fn tag_sentences(&self, sentences: &[SentenceRecord]) -> Result<Labels> {
        Ok(self.decode_all(sentences, false)?.0)
    }

    /// Labels for every position of every sentence, plus the attention rows when requested
    fn decode_all(
        &self,
        sentences: &[SentenceRecord],
        return_attention: bool,
    ) -> Result<(Labels, Option<Vec<Vec<Vec<f32>>>>)> {
        let model = self.built("predict")?.valid();

        if return_attention && !model.attends() {
            return Err(TaggerError::config(
                "attention weights requested from a model without pre-attention",
            ));
        }

        for (i, sentence) in sentences.iter().enumerate() {
            sentence.check_lengths().map_err(|e| match e {
                TaggerError::Data(message) => TaggerError::data(format!("sentence {i}: {message}")),
                other => other,
            })?;
        }

        let batcher = self.token_batcher::<B::InnerBackend>()?;
        let lengths: Vec<usize> = sentences.iter().map(SentenceRecord::len).collect();

        let heads = self.datasets.len();
        let mut labels = vec![vec![Vec::new(); sentences.len()]; heads];
        let mut attention = vec![Vec::new(); sentences.len()];

        for bucket in bucket_by_length(&lengths, self.config.batch_size, None) {
            let batch = batcher.batch(indexed(sentences, &bucket));
            let decoded = decode(&model, &batch, return_attention);

            for (head, sentences) in decoded.labels.into_iter().enumerate() {
                for (&index, sentence) in batch.indices.iter().zip(sentences) {
                    labels[head][index] = sentence;
                }
            }

            for (&index, weights) in batch.indices.iter().zip(decoded.attention.unwrap_or_default()) {
                attention[index] = weights;
            }
        }

        let mappings = self
            .mappings
            .as_ref()
            .ok_or_else(|| TaggerError::state("mappings were never set"))?;

        let labels = self
            .datasets
            .iter()
            .zip(labels)
            .map(|((name, descriptor), sentences)| {
                let id2label = mappings.require(&descriptor.label)?.id2label();

                let sentences = sentences
                    .iter()
                    .map(|ids| classes::class_names(&id2label, ids))
                    .collect();

                Ok((name.clone(), sentences))
            })
            .collect::<Result<Labels>>()?;

        Ok((labels, return_attention.then_some(attention)))
    }

    /// Restore a built tagger saved with [`Tagger::save`]
    pub async fn load(dir: impl AsRef<Path>, device: B::Device) -> Result<Self> {
        let dir = dir.as_ref();

        let config = TaggerConfig::load(dir.join(TAGGER_CONFIG_FILE))
            .map_err(|e| TaggerError::config(format!("unable to load tagger parameters: {e}")))?;
        let model_config = ModelConfig::load(dir.join(MODEL_CONFIG_FILE))
            .map_err(|e| TaggerError::config(format!("unable to load model description: {e}")))?;

        let vocabulary: Vocabulary =
            serde_json::from_str(&files::read_to_string(dir.join(VOCABULARY_FILE)).await?)?;

        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(dir.join(MODEL_FILE), &device)
            .map_err(|e| TaggerError::Record(e.to_string()))?;

        let model = model_config.init::<B>(&device).load_record(record);

        log::info!(
            "Loaded tagger from {} ({} epoch(s) trained)",
            dir.display(),
            vocabulary.epochs_trained
        );

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            device,
            mappings: Some(vocabulary.mappings),
            embeddings: None,
            datasets: vocabulary.datasets,
            data: BTreeMap::new(),
            model: Some(model),
            model_config: Some(model_config),
            epochs_trained: vocabulary.epochs_trained,
        })
    }
}
