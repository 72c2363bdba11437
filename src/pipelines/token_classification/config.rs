use burn::{config::Config as _, LearningRate};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{self, TaggerError},
    models::bilstm::{AttentionConfig, CharEncoding},
};

/// Optimizer used by `fit`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Adam
    #[default]
    Adam,
    /// Adam with decoupled weight decay
    AdamW,
}

/// Classifier parameters of the tagger
#[derive(burn::config::Config, Debug)]
pub struct TaggerConfig {
    /// Hidden size per direction of each BiLSTM layer
    #[config(default = 100)]
    pub lstm_size: usize,

    /// Number of stacked BiLSTM layers
    #[config(default = 1)]
    pub lstm_layers: usize,

    /// Dropout rate
    #[config(default = 0.25)]
    pub dropout: f64,

    /// Learned casing embedding size, one-hot casing vectors when absent
    pub casing_embedding_size: Option<usize>,

    /// Character embedding size, no character stream when absent
    pub char_embeddings_size: Option<usize>,

    /// Character encoder kind
    #[config(default = "CharEncoding::Lstm")]
    pub char_encoding: CharEncoding,

    /// Hidden size per direction of the character LSTM
    #[config(default = 25)]
    pub char_lstm_size: usize,

    /// Filters of the character CNN
    #[config(default = 30)]
    pub char_filters: usize,

    /// Width of the character convolution
    #[config(default = 3)]
    pub char_kernel_size: usize,

    /// Characters kept per word
    #[config(default = 25)]
    pub max_char_length: usize,

    /// Pre-attention, if any
    pub attention: Option<AttentionConfig>,

    /// Train the token embedding along with the network
    #[config(default = false)]
    pub fine_tune_embeddings: bool,

    /// Batch size
    #[config(default = 32)]
    pub batch_size: usize,

    /// Optimizer
    #[config(default = "OptimizerKind::Adam")]
    pub optimizer: OptimizerKind,

    /// Initial learning rate
    #[config(default = 1e-3)]
    pub learning_rate: LearningRate,

    /// Adam epsilon
    #[config(default = 1e-8)]
    pub adam_epsilon: f32,

    /// Weight decay of AdamW
    #[config(default = 1e-4)]
    pub weight_decay: f32,

    /// Gradient norm clipping threshold, 0 disables clipping
    #[config(default = 1.0)]
    pub clip_norm: f32,

    /// Seed for parameter initialization and shuffling
    #[config(default = 42)]
    pub seed: u64,

    /// Shuffle sentences within their length bucket every epoch
    #[config(default = true)]
    pub shuffle: bool,
}

impl TaggerConfig {
    /// Parse a YAML parameter file; absent keys keep their defaults
    pub fn from_yaml(text: &str) -> errors::Result<Self> {
        let overrides = match serde_yaml::from_str::<serde_json::Value>(text)? {
            serde_json::Value::Null => serde_json::Map::new(),
            serde_json::Value::Object(overrides) => overrides,
            other => {
                return Err(TaggerError::config(format!(
                    "tagger parameters must be a mapping, got {other}"
                )))
            }
        };

        let mut value = serde_json::to_value(TaggerConfig::new())?;
        if let serde_json::Value::Object(defaults) = &mut value {
            defaults.extend(overrides);
        }

        TaggerConfig::load_binary(value.to_string().as_bytes())
            .map_err(|e| TaggerError::config(format!("invalid tagger parameters: {e}")))
    }

    /// Reject parameter combinations the network cannot be built from
    pub fn validate(&self) -> errors::Result<()> {
        let positive = [
            ("lstm_size", self.lstm_size),
            ("lstm_layers", self.lstm_layers),
            ("batch_size", self.batch_size),
            ("max_char_length", self.max_char_length),
            ("char_kernel_size", self.char_kernel_size),
        ];

        for (name, value) in positive {
            if value == 0 {
                return Err(TaggerError::config(format!("{name} must be positive")));
            }
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TaggerError::config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }

        if self.clip_norm < 0.0 {
            return Err(TaggerError::config("clip_norm must not be negative"));
        }

        if self.char_embeddings_size == Some(0) || self.casing_embedding_size == Some(0) {
            return Err(TaggerError::config("embedding sizes must be positive"));
        }

        if self.attention.as_ref().is_some_and(|attention| attention.size == 0) {
            return Err(TaggerError::config("attention size must be positive"));
        }

        Ok(())
    }
}
