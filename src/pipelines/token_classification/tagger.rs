use std::collections::BTreeMap;

use burn::tensor::backend::{AutodiffBackend, Backend};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    datasets::{DatasetDescriptor, DatasetSplits, Split},
    embeddings::EmbeddingMatrix,
    errors::{Result, TaggerError},
    mappings::{Casing, Mapping, Mappings, CASING, CHARACTERS},
    models::bilstm::{CharacterConfig, HeadConfig, Model, ModelConfig},
};

use super::{
    batcher::{CharacterLookup, TokenBatcher, TrainBatcher},
    SentenceRecord, TaggerConfig,
};

/// Where a tagger is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// No network yet
    Unbuilt,
    /// Network built, never fitted
    Built,
    /// Fitted for at least one epoch
    Trained,
}

/// BiLSTM sequence tagger: mappings and datasets in, per-token labels out
///
/// Lifecycle: [`set_mappings`](Tagger::set_mappings) and [`set_dataset`](Tagger::set_dataset),
/// then [`build_model`](Tagger::build_model), then any number of [`fit`](Tagger::fit) and
/// [`predict`](Tagger::predict) calls.
pub struct Tagger<B: AutodiffBackend> {
    pub(crate) config: TaggerConfig,
    pub(crate) device: B::Device,
    pub(crate) mappings: Option<Mappings>,
    pub(crate) embeddings: Option<EmbeddingMatrix>,
    pub(crate) datasets: BTreeMap<String, DatasetDescriptor>,
    pub(crate) data: BTreeMap<String, DatasetSplits>,
    pub(crate) model: Option<Model<B>>,
    pub(crate) model_config: Option<ModelConfig>,
    pub(crate) rng: StdRng,
    pub(crate) epochs_trained: usize,
}

impl<B: AutodiffBackend> Tagger<B> {
    /// Create an unbuilt tagger
    pub fn new(config: TaggerConfig, device: B::Device) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            device,
            mappings: None,
            embeddings: None,
            datasets: BTreeMap::new(),
            data: BTreeMap::new(),
            model: None,
            model_config: None,
            epochs_trained: 0,
        })
    }

    /// The classifier parameters
    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    /// The mappings, once set
    pub fn mappings(&self) -> Option<&Mappings> {
        self.mappings.as_ref()
    }

    /// The dataset descriptors by name
    pub fn datasets(&self) -> &BTreeMap<String, DatasetDescriptor> {
        &self.datasets
    }

    /// The network, once built
    pub fn model(&self) -> Option<&Model<B>> {
        self.model.as_ref()
    }

    /// The network description, once built
    pub fn model_config(&self) -> Option<&ModelConfig> {
        self.model_config.as_ref()
    }

    /// Total epochs fitted since the network was built
    pub fn epochs_trained(&self) -> usize {
        self.epochs_trained
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        match (&self.model, self.epochs_trained) {
            (None, _) => LifecycleState::Unbuilt,
            (Some(_), 0) => LifecycleState::Built,
            (Some(_), _) => LifecycleState::Trained,
        }
    }

    /// Set the vocabulary mappings and the token embedding matrix
    ///
    /// A missing `casing` mapping defaults to the standard casing codes; a missing `characters`
    /// mapping defaults to the standard character set when characters are enabled.
    pub fn set_mappings(&mut self, mut mappings: Mappings, embeddings: EmbeddingMatrix) -> Result<()> {
        if self.model.is_some() {
            return Err(TaggerError::state(
                "mappings cannot change once the model is built",
            ));
        }

        if !mappings.contains(CASING) {
            mappings.insert(CASING, Casing::mapping());
        }

        if self.config.char_embeddings_size.is_some() && !mappings.contains(CHARACTERS) {
            mappings.insert(CHARACTERS, Mapping::characters());
        }

        mappings.validate()?;

        let vocab_size = mappings.tokens()?.vocab_size();
        if embeddings.rows() < vocab_size {
            return Err(TaggerError::config(format!(
                "the embedding matrix has {} rows but the tokens mapping needs {vocab_size}",
                embeddings.rows()
            )));
        }

        if embeddings.dim() == 0 {
            return Err(TaggerError::config("the embedding matrix has no columns"));
        }

        log::debug!(
            "Mappings set: {} token rows of size {}",
            embeddings.rows(),
            embeddings.dim()
        );

        self.mappings = Some(mappings);
        self.embeddings = Some(embeddings);

        Ok(())
    }

    /// Set the dataset descriptors and their train/dev/test sentences
    pub fn set_dataset(
        &mut self,
        datasets: BTreeMap<String, DatasetDescriptor>,
        data: BTreeMap<String, DatasetSplits>,
    ) -> Result<()> {
        if self.model.is_some() {
            return Err(TaggerError::state(
                "datasets cannot change once the model is built",
            ));
        }

        let mappings = self
            .mappings
            .as_ref()
            .ok_or_else(|| TaggerError::config("set the mappings before the datasets"))?;

        if datasets.is_empty() {
            return Err(TaggerError::config("no dataset descriptors given"));
        }

        for name in data.keys() {
            if !datasets.contains_key(name) {
                return Err(TaggerError::config(format!(
                    "data given for undescribed dataset '{name}'"
                )));
            }
        }

        for (name, descriptor) in &datasets {
            let splits = data
                .get(name)
                .ok_or_else(|| TaggerError::config(format!("no data for dataset '{name}'")))?;

            let labels = mappings.get(&descriptor.label).ok_or_else(|| {
                TaggerError::config(format!(
                    "dataset '{name}' labels column '{}' has no mapping",
                    descriptor.label
                ))
            })?;

            for split in Split::ALL {
                let labelled = split == Split::Train || descriptor.evaluate;

                for (i, record) in splits.split(split).iter().enumerate() {
                    self.check_record(record, &descriptor.label, labels, labelled)
                        .map_err(|e| match e {
                            TaggerError::Data(message) => TaggerError::data(format!(
                                "dataset '{name}' {split} sentence {i}: {message}"
                            )),
                            other => other,
                        })?;
                }
            }

            log::info!(
                "Dataset '{}': {} train, {} dev, {} test sentences",
                name,
                splits.train.len(),
                splits.dev.len(),
                splits.test.len()
            );
        }

        self.datasets = datasets;
        self.data = data;

        Ok(())
    }

    fn check_record(
        &self,
        record: &SentenceRecord,
        column: &str,
        labels: &Mapping,
        labelled: bool,
    ) -> Result<()> {
        record.check_lengths()?;

        let rows = self.embeddings.as_ref().map_or(0, EmbeddingMatrix::rows);
        if let Some(token) = record.tokens.iter().find(|&&token| token >= rows) {
            return Err(TaggerError::data(format!(
                "token index {token} is outside the {rows} embedding rows"
            )));
        }

        let mappings = self.mappings.as_ref();
        let size = |stream: &str| {
            mappings
                .and_then(|mappings| mappings.get(stream))
                .map_or(0, Mapping::vocab_size)
        };

        within_mapping(CASING, size(CASING), record.casing.iter().copied())?;

        if let (Some(characters), Some(_)) = (&record.characters, self.config.char_embeddings_size) {
            within_mapping(
                CHARACTERS,
                size(CHARACTERS),
                characters.iter().flatten().copied(),
            )?;
        }

        match record.labels(column) {
            Some(values) => {
                if let Some(label) = values.iter().find(|&&label| label >= labels.vocab_size()) {
                    return Err(TaggerError::data(format!(
                        "label {label} is outside the '{column}' mapping"
                    )));
                }
            }
            None if labelled => {
                return Err(TaggerError::data(format!("missing '{column}' labels")));
            }
            None => {}
        }

        Ok(())
    }

    /// Construct the network from the parameters, mappings, embeddings and datasets
    pub fn build_model(&mut self) -> Result<()> {
        if self.model.is_some() {
            return Err(TaggerError::config(
                "the model is already built, reset the tagger to rebuild it",
            ));
        }

        let (mappings, embeddings) = match (&self.mappings, &self.embeddings) {
            (Some(mappings), Some(embeddings)) => (mappings, embeddings),
            _ => return Err(TaggerError::config("mappings and embeddings were never set")),
        };

        if self.datasets.is_empty() {
            return Err(TaggerError::config("datasets were never set"));
        }

        let model_config = self.describe_model(mappings, embeddings)?;

        // Parameter initialization draws from the backend generator
        B::seed(self.config.seed);

        let model = model_config.init_with_embeddings::<B>(embeddings, &self.device);

        log::info!(
            "Built model: {} layer(s) of {} units, word features {}, heads {:?}, attention {:?}",
            model_config.lstm_layers,
            model_config.lstm_size,
            model_config.word_size(),
            self.datasets.keys().collect::<Vec<_>>(),
            model_config.attention.as_ref().map(|attention| attention.variant)
        );

        self.model = Some(model);
        self.model_config = Some(model_config);
        self.epochs_trained = 0;

        Ok(())
    }

    /// Drop the network so the tagger can be rebuilt
    pub fn reset(&mut self) {
        self.model = None;
        self.model_config = None;
        self.epochs_trained = 0;
        self.rng = StdRng::seed_from_u64(self.config.seed);
    }

    fn describe_model(&self, mappings: &Mappings, embeddings: &EmbeddingMatrix) -> Result<ModelConfig> {
        let heads = self
            .datasets
            .iter()
            .map(|(name, descriptor)| {
                Ok(HeadConfig {
                    dataset: name.clone(),
                    n_classes: mappings.require(&descriptor.label)?.vocab_size(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let characters = match self.config.char_embeddings_size {
            Some(embedding_size) => Some(CharacterConfig {
                vocab_size: mappings.require(CHARACTERS)?.vocab_size(),
                embedding_size,
                encoding: self.config.char_encoding,
                lstm_size: self.config.char_lstm_size,
                filters: self.config.char_filters,
                kernel_size: self.config.char_kernel_size,
            }),
            None => None,
        };

        Ok(ModelConfig::new(
            embeddings.rows(),
            embeddings.dim(),
            mappings.casing()?.vocab_size(),
            self.config.lstm_size,
            self.config.lstm_layers,
            self.config.dropout,
            heads,
        )
        .with_casing_embedding_size(self.config.casing_embedding_size)
        .with_characters(characters)
        .with_attention(self.config.attention.clone())
        .with_fine_tune_embeddings(self.config.fine_tune_embeddings))
    }

    /// The built network, or a state error naming the operation
    pub(crate) fn built(&self, operation: &str) -> Result<&Model<B>> {
        self.model.as_ref().ok_or_else(|| {
            TaggerError::state(format!("{operation} requires build_model to have run"))
        })
    }

    /// A batcher padding sentences for the given backend
    pub(crate) fn token_batcher<BB: Backend<Device = B::Device>>(&self) -> Result<TokenBatcher<BB>> {
        let mappings = self
            .mappings
            .as_ref()
            .ok_or_else(|| TaggerError::state("mappings were never set"))?;

        let characters = match self.config.char_embeddings_size {
            Some(_) => Some(CharacterLookup::new(
                mappings.require(CHARACTERS)?.clone(),
                self.config.max_char_length,
            )),
            None => None,
        };

        Ok(TokenBatcher::new(
            mappings.tokens()?.clone(),
            mappings.casing()?.clone(),
            characters,
            self.device.clone(),
        ))
    }

    /// One training batcher per dataset head, in head order
    pub(crate) fn train_batchers<BB: Backend<Device = B::Device>>(
        &self,
    ) -> Result<Vec<(String, TrainBatcher<BB>)>> {
        let batcher = self.token_batcher::<BB>()?;
        let model_config = self
            .model_config
            .as_ref()
            .ok_or_else(|| TaggerError::state("the model was never built"))?;

        self.datasets
            .iter()
            .zip(&model_config.heads)
            .enumerate()
            .map(|(head, ((name, descriptor), config))| {
                Ok((
                    name.clone(),
                    TrainBatcher::new(
                        batcher.clone(),
                        head,
                        descriptor.label.clone(),
                        config.n_classes,
                    ),
                ))
            })
            .collect()
    }
}

/// Fail on the first index a stream's mapping cannot address
fn within_mapping(stream: &str, size: usize, mut indexes: impl Iterator<Item = usize>) -> Result<()> {
    match indexes.find(|&index| index >= size) {
        Some(index) => Err(TaggerError::data(format!(
            "{stream} index {index} is outside the mapping (size {size})"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_the_first_unaddressable_index() {
        assert!(within_mapping(CASING, 8, [0, 4, 7].into_iter()).is_ok());

        let error = within_mapping(CASING, 8, [1, 9, 12].into_iter()).unwrap_err();
        assert!(matches!(&error, TaggerError::Data(message) if message.contains("index 9")));
    }
}
