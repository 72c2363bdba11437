//! Build-time description of the BiLSTM tagger network

use burn::{
    module::{Module, Param},
    nn::{
        conv::Conv1dConfig, lstm::LstmConfig, DropoutConfig, Embedding, EmbeddingConfig,
        EmbeddingRecord, LinearConfig, PaddingConfig1d,
    },
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};

use crate::{embeddings::EmbeddingMatrix, utils::tensors};

use super::{
    attention::{FeatureAttention, TimeAttention},
    encoder::{BiLstm, CharCnn, CharEncoder, CharLstm, Encoder},
    Model,
};

/// Which axis pre-attention re-weights
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionVariant {
    /// Re-weight positions: every token attends over the whole sentence
    Time,
    /// Re-weight feature channels of every token
    Feature,
}

/// How attention scores are computed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFunction {
    /// Scaled dot products (time) or linear scores (feature)
    #[default]
    Multiplicative,
    /// A tanh hidden layer followed by a linear energy projection
    Additive,
}

/// Whether feature weights are computed per token or once per sentence
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureScope {
    /// One channel distribution per token
    #[default]
    PerPosition,
    /// One channel distribution per sentence, from the masked mean of the token scores
    Shared,
}

/// Pre-attention settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttentionConfig {
    /// Attention axis
    pub variant: AttentionVariant,

    /// Score function
    #[serde(default)]
    pub score: ScoreFunction,

    /// Feature weight scope, ignored by time attention
    #[serde(default)]
    pub scope: FeatureScope,

    /// Size of the query/key projections and additive hidden layers
    #[serde(default = "AttentionConfig::default_size")]
    pub size: usize,
}

impl AttentionConfig {
    /// Attention along an axis with the default score function
    pub fn new(variant: AttentionVariant) -> Self {
        Self {
            variant,
            score: ScoreFunction::default(),
            scope: FeatureScope::default(),
            size: Self::default_size(),
        }
    }

    /// Time-wise pre-attention
    pub fn time() -> Self {
        Self::new(AttentionVariant::Time)
    }

    /// Feature-wise pre-attention
    pub fn feature() -> Self {
        Self::new(AttentionVariant::Feature)
    }

    /// Set the score function
    pub fn with_score(mut self, score: ScoreFunction) -> Self {
        self.score = score;
        self
    }

    /// Set the feature scope
    pub fn with_scope(mut self, scope: FeatureScope) -> Self {
        self.scope = scope;
        self
    }

    fn default_size() -> usize {
        64
    }
}

/// How a word's characters are reduced to a fixed-size vector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharEncoding {
    /// Final states of a bidirectional LSTM over the characters
    #[default]
    Lstm,
    /// Max-pooled convolution over the characters
    Cnn,
}

/// Character stream settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterConfig {
    /// Rows of the character embedding
    pub vocab_size: usize,
    /// Character embedding size
    pub embedding_size: usize,
    /// Encoder kind
    pub encoding: CharEncoding,
    /// Hidden size per direction of the character LSTM
    pub lstm_size: usize,
    /// Number of convolution filters
    pub filters: usize,
    /// Convolution width
    pub kernel_size: usize,
}

impl CharacterConfig {
    /// Size of the per-word character representation
    pub fn output_size(&self) -> usize {
        match self.encoding {
            CharEncoding::Lstm => 2 * self.lstm_size,
            CharEncoding::Cnn => self.filters,
        }
    }
}

/// One output layer per dataset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadConfig {
    /// Dataset name
    pub dataset: String,
    /// Label-space size
    pub n_classes: usize,
}

/// The Model Configuration
#[derive(burn::config::Config, Debug)]
pub struct ModelConfig {
    /// Rows of the token embedding
    pub token_vocab_size: usize,
    /// Token embedding size
    pub token_embedding_size: usize,
    /// Rows of the casing embedding
    pub casing_vocab_size: usize,
    /// Learned casing embedding size; one-hot casing vectors when absent
    pub casing_embedding_size: Option<usize>,
    /// Character stream, if enabled
    pub characters: Option<CharacterConfig>,
    /// Hidden size per direction of each BiLSTM layer
    pub lstm_size: usize,
    /// Number of stacked BiLSTM layers
    pub lstm_layers: usize,
    /// Dropout probability
    pub dropout: f64,
    /// Pre-attention, if any
    pub attention: Option<AttentionConfig>,
    /// Output heads in dataset-name order
    pub heads: Vec<HeadConfig>,
    /// Whether the token embedding is updated during training
    #[config(default = false)]
    pub fine_tune_embeddings: bool,
}

impl ModelConfig {
    /// Size of the casing vectors
    pub fn casing_size(&self) -> usize {
        self.casing_embedding_size.unwrap_or(self.casing_vocab_size)
    }

    /// Size of the concatenated per-token feature vector
    pub fn word_size(&self) -> usize {
        self.token_embedding_size
            + self.casing_size()
            + self
                .characters
                .as_ref()
                .map_or(0, CharacterConfig::output_size)
    }

    /// Size of the contextual representation
    pub fn hidden_size(&self) -> usize {
        2 * self.lstm_size
    }

    /// Initialize the model with random token embeddings
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        let hidden_size = self.hidden_size();

        let encoder = Encoder {
            tokens: EmbeddingConfig::new(self.token_vocab_size, self.token_embedding_size)
                .init(device),
            casing: match self.casing_embedding_size {
                Some(size) => EmbeddingConfig::new(self.casing_vocab_size, size).init(device),
                None => one_hot(self.casing_vocab_size, device),
            },
            characters: self.characters.as_ref().map(|config| char_encoder(config, device)),
            layers: (0..self.lstm_layers.max(1))
                .map(|layer| {
                    let d_input = if layer == 0 {
                        self.word_size()
                    } else {
                        hidden_size
                    };

                    BiLstm {
                        left_to_right: LstmConfig::new(d_input, self.lstm_size, true).init(device),
                        right_to_left: LstmConfig::new(d_input, self.lstm_size, true).init(device),
                    }
                })
                .collect(),
            dropout: DropoutConfig::new(self.dropout).init(),
            freeze_tokens: !self.fine_tune_embeddings,
            freeze_casing: self.casing_embedding_size.is_none(),
        };

        let attention = self.attention.as_ref();
        let time_attention = attention
            .filter(|config| config.variant == AttentionVariant::Time)
            .map(|config| TimeAttention {
                query: LinearConfig::new(hidden_size, config.size).init(device),
                key: LinearConfig::new(hidden_size, config.size).init(device),
                energy: (config.score == ScoreFunction::Additive)
                    .then(|| LinearConfig::new(config.size, 1).init(device)),
                d_attention: config.size,
            });
        let feature_attention = attention
            .filter(|config| config.variant == AttentionVariant::Feature)
            .map(|config| match config.score {
                ScoreFunction::Multiplicative => FeatureAttention {
                    projection: LinearConfig::new(hidden_size, hidden_size).init(device),
                    energy: None,
                    shared: config.scope == FeatureScope::Shared,
                },
                ScoreFunction::Additive => FeatureAttention {
                    projection: LinearConfig::new(hidden_size, config.size).init(device),
                    energy: Some(LinearConfig::new(config.size, hidden_size).init(device)),
                    shared: config.scope == FeatureScope::Shared,
                },
            });

        let heads = self
            .heads
            .iter()
            .map(|head| LinearConfig::new(hidden_size, head.n_classes).init(device))
            .collect();

        Model {
            encoder,
            time_attention,
            feature_attention,
            heads,
        }
    }

    /// Initialize the model with pretrained token embeddings
    pub fn init_with_embeddings<B: Backend>(
        &self,
        embeddings: &EmbeddingMatrix,
        device: &B::Device,
    ) -> Model<B> {
        let mut model = self.init(device);

        model.encoder.tokens = model.encoder.tokens.load_record(EmbeddingRecord {
            weight: Param::from_tensor(embeddings.to_tensor(device)),
        });

        model
    }
}

/// An embedding whose rows form an identity matrix
fn one_hot<B: Backend>(size: usize, device: &B::Device) -> Embedding<B> {
    let values = (0..size * size)
        .map(|i| if i / size == i % size { 1.0 } else { 0.0 })
        .collect();

    EmbeddingConfig::new(size, size)
        .init(device)
        .load_record(EmbeddingRecord {
            weight: Param::from_tensor(tensors::from_values(values, [size, size], device)),
        })
}

fn char_encoder<B: Backend>(config: &CharacterConfig, device: &B::Device) -> CharEncoder<B> {
    let embedding = EmbeddingConfig::new(config.vocab_size, config.embedding_size).init(device);

    match config.encoding {
        CharEncoding::Lstm => CharEncoder {
            lstm: Some(CharLstm {
                embedding,
                left_to_right: LstmConfig::new(config.embedding_size, config.lstm_size, true)
                    .init(device),
                right_to_left: LstmConfig::new(config.embedding_size, config.lstm_size, true)
                    .init(device),
                d_hidden: config.lstm_size,
            }),
            cnn: None,
        },
        CharEncoding::Cnn => CharEncoder {
            lstm: None,
            cnn: Some(CharCnn {
                embedding,
                conv: Conv1dConfig::new(config.embedding_size, config.filters, config.kernel_size)
                    .with_padding(PaddingConfig1d::Same)
                    .init(device),
                filters: config.filters,
            }),
        },
    }
}
