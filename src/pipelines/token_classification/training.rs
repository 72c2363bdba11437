use std::{collections::BTreeMap, fs::File, path::Path};

use burn::{
    config::Config as _,
    data::dataloader::batcher::Batcher,
    grad_clipping::GradientClippingConfig,
    module::{AutodiffModule, Module},
    optim::{decay::WeightDecayConfig, AdamConfig, AdamWConfig, Optimizer},
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
    train::{TrainStep, ValidStep},
};
use serde::{Deserialize, Serialize};

use crate::{
    datasets::{DatasetDescriptor, Split},
    errors::{Result, TaggerError},
    mappings::Mappings,
    models::bilstm::Model,
};

use super::{
    batcher::{bucket_by_length, TrainBatcher},
    config::OptimizerKind,
    Indexed, SentenceRecord, Tagger,
};

/// Parameter record file name, without the recorder's extension
pub const MODEL_FILE: &str = "model";

/// Classifier parameters file
pub const TAGGER_CONFIG_FILE: &str = "tagger.json";

/// Network description file
pub const MODEL_CONFIG_FILE: &str = "model.json";

/// Mappings and dataset descriptors file
pub const VOCABULARY_FILE: &str = "vocabulary.json";

/// Loss and accuracy over the labelled positions of one split
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Mean cross entropy per labelled position
    pub loss: f32,

    /// Fraction of labelled positions predicted correctly
    pub accuracy: f32,

    /// Number of labelled positions
    pub positions: usize,
}

impl Score {
    fn accumulate(&mut self, loss: f32, correct: usize, positions: usize) {
        // Running sums, normalized by `finish`
        self.loss += loss * positions as f32;
        self.accuracy += correct as f32;
        self.positions += positions;
    }

    fn finish(mut self) -> Self {
        if self.positions > 0 {
            self.loss /= self.positions as f32;
            self.accuracy /= self.positions as f32;
        }

        self
    }
}

/// Metrics of one epoch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// Epoch number, counted since the model was built
    pub epoch: usize,

    /// Training metrics per dataset
    pub train: BTreeMap<String, Score>,

    /// Development metrics for evaluated datasets
    pub dev: BTreeMap<String, Score>,

    /// Test metrics for evaluated datasets
    pub test: BTreeMap<String, Score>,
}

/// Metrics of a `fit` call
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// One entry per epoch run
    pub epochs: Vec<EpochReport>,
}

/// Mappings and descriptors needed to rebuild the batchers of a saved tagger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Vocabulary {
    pub mappings: Mappings,
    pub datasets: BTreeMap<String, DatasetDescriptor>,
    pub epochs_trained: usize,
}

impl<B: AutodiffBackend> Tagger<B> {
    /// Train for `epochs` passes over the training sentences of every dataset
    ///
    /// Each length bucket drives one optimizer step. Repeated calls continue from the current
    /// weights with a fresh optimizer state.
    pub fn fit(&mut self, epochs: usize) -> Result<FitReport> {
        self.built("fit")?;

        if epochs == 0 {
            return Ok(FitReport::default());
        }

        let trainable = self
            .data
            .values()
            .any(|splits| splits.train.iter().any(|record| !record.is_empty()));

        if !trainable {
            return Err(TaggerError::config(
                "no training sentences, set the datasets before fitting",
            ));
        }

        let clipping = (self.config.clip_norm > 0.0)
            .then_some(GradientClippingConfig::Norm(self.config.clip_norm));

        match self.config.optimizer {
            OptimizerKind::Adam => {
                let optim = AdamConfig::new()
                    .with_epsilon(self.config.adam_epsilon)
                    .with_weight_decay(
                        (self.config.weight_decay > 0.0)
                            .then_some(WeightDecayConfig::new(f64::from(self.config.weight_decay))),
                    )
                    .with_grad_clipping(clipping)
                    .init::<B, Model<B>>();

                self.run_epochs(epochs, optim)
            }
            OptimizerKind::AdamW => {
                let optim = AdamWConfig::new()
                    .with_epsilon(self.config.adam_epsilon)
                    .with_weight_decay(self.config.weight_decay)
                    .with_grad_clipping(clipping)
                    .init::<B, Model<B>>();

                self.run_epochs(epochs, optim)
            }
        }
    }

    fn run_epochs<O: Optimizer<Model<B>, B>>(&mut self, epochs: usize, mut optim: O) -> Result<FitReport> {
        let batchers = self.train_batchers::<B>()?;
        let valid_batchers = self.train_batchers::<B::InnerBackend>()?;

        let mut model = self
            .model
            .take()
            .ok_or_else(|| TaggerError::state("fit requires build_model to have run"))?;

        let mut report = FitReport::default();

        for _ in 0..epochs {
            let epoch = self.epochs_trained + 1;
            let mut train = BTreeMap::new();

            for (name, batcher) in &batchers {
                let records = self.data.get(name).map_or(&[][..], |splits| &splits.train);
                let lengths: Vec<usize> = records.iter().map(SentenceRecord::len).collect();

                let rng = self.config.shuffle.then_some(&mut self.rng);
                let mut score = Score::default();

                for bucket in bucket_by_length(&lengths, self.config.batch_size, rng) {
                    let item = batcher.batch(indexed(records, &bucket));
                    let positions = item.positions;

                    if positions == 0 {
                        continue;
                    }

                    let output = TrainStep::step(&model, item);
                    score.accumulate(output.item.loss_value(), output.item.correct(), positions);

                    model = optim.step(self.config.learning_rate, model, output.grads);
                }

                train.insert(name.clone(), score.finish());
            }

            let valid = model.valid();
            let dev = self.evaluate(&valid, &valid_batchers, Split::Dev);
            let test = self.evaluate(&valid, &valid_batchers, Split::Test);

            for (name, score) in &train {
                log::info!(
                    "Epoch {} [{}] train loss {:.4} accuracy {:.4}",
                    epoch,
                    name,
                    score.loss,
                    score.accuracy
                );
            }
            for (name, score) in &dev {
                log::info!(
                    "Epoch {} [{}] dev loss {:.4} accuracy {:.4}, test accuracy {:.4}",
                    epoch,
                    name,
                    score.loss,
                    score.accuracy,
                    test.get(name).map_or(0.0, |score| score.accuracy)
                );
            }

            self.epochs_trained = epoch;
            report.epochs.push(EpochReport {
                epoch,
                train,
                dev,
                test,
            });
        }

        self.model = Some(model);

        Ok(report)
    }

    /// Loss and accuracy of the evaluated datasets on one split
    fn evaluate(
        &self,
        model: &Model<B::InnerBackend>,
        batchers: &[(String, TrainBatcher<B::InnerBackend>)],
        split: Split,
    ) -> BTreeMap<String, Score> {
        let mut scores = BTreeMap::new();

        for (name, batcher) in batchers {
            let evaluated = self
                .datasets
                .get(name)
                .is_some_and(|descriptor| descriptor.evaluate);

            let records = match self.data.get(name) {
                Some(splits) if evaluated => splits.split(split),
                _ => continue,
            };

            if records.is_empty() {
                continue;
            }

            let lengths: Vec<usize> = records.iter().map(SentenceRecord::len).collect();
            let mut score = Score::default();

            for bucket in bucket_by_length(&lengths, self.config.batch_size, None) {
                let item = batcher.batch(indexed(records, &bucket));
                let positions = item.positions;

                let output = ValidStep::step(model, item);
                score.accumulate(output.loss_value(), output.correct(), positions);
            }

            scores.insert(name.clone(), score.finish());
        }

        scores
    }

    /// Write the parameters, the network description, the vocabulary and the weights to `dir`
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        let model = self.built("save")?;

        let (model_config, mappings) = match (&self.model_config, &self.mappings) {
            (Some(model_config), Some(mappings)) => (model_config, mappings),
            _ => return Err(TaggerError::state("save requires a fully configured tagger")),
        };

        std::fs::create_dir_all(dir)?;

        self.config.save(dir.join(TAGGER_CONFIG_FILE))?;
        model_config.save(dir.join(MODEL_CONFIG_FILE))?;

        let vocabulary = Vocabulary {
            mappings: mappings.clone(),
            datasets: self.datasets.clone(),
            epochs_trained: self.epochs_trained,
        };
        serde_json::to_writer_pretty(File::create(dir.join(VOCABULARY_FILE))?, &vocabulary)?;

        NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .record(model.clone().into_record(), dir.join(MODEL_FILE))
            .map_err(|e| TaggerError::Record(e.to_string()))?;

        log::info!("Saved tagger to {}", dir.display());

        Ok(())
    }
}

/// Pair the selected records with their positions
pub(crate) fn indexed(records: &[SentenceRecord], selection: &[usize]) -> Vec<Indexed> {
    selection
        .iter()
        .map(|&index| Indexed::new(index, records[index].clone()))
        .collect()
}
