use burn::{
    module::Module,
    nn::{conv::Conv1d, lstm::Lstm, Dropout, Embedding},
    tensor::{activation::relu, backend::Backend, Tensor},
};

use crate::pipelines::token_classification::batcher::{Batch, Characters};

/// Token, casing and character features fed through stacked BiLSTM layers
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    /// Token embedding, usually pretrained
    pub tokens: Embedding<B>,

    /// Casing embedding, learned or one-hot
    pub casing: Embedding<B>,

    /// Character encoder, if enabled
    pub characters: Option<CharEncoder<B>>,

    /// Stacked bidirectional layers
    pub layers: Vec<BiLstm<B>>,

    /// Dropout on the word features and between layers
    pub dropout: Dropout,

    /// Keep the token embedding out of the gradient
    pub freeze_tokens: bool,

    /// Keep the casing embedding out of the gradient
    pub freeze_casing: bool,
}

impl<B: Backend> Encoder<B> {
    /// Contextual representation of every position: `[batch_size, seq_length, 2 * lstm_size]`
    pub fn forward(&self, input: &Batch<B>) -> Tensor<B, 3> {
        let [batch_size, seq_length] = input.tokens.dims();

        let mut tokens = self.tokens.forward(input.tokens.clone());
        if self.freeze_tokens {
            tokens = tokens.detach();
        }

        let mut casing = self.casing.forward(input.casing.clone());
        if self.freeze_casing {
            casing = casing.detach();
        }

        let mut features = vec![tokens, casing];

        if let (Some(encoder), Some(characters)) = (&self.characters, &input.characters) {
            for words in encoder.forward(characters) {
                let [_, d_chars] = words.dims();

                features.push(words.reshape([batch_size, seq_length, d_chars]));
            }
        }

        let mut hidden = self.dropout.forward(Tensor::cat(features, 2));

        for layer in &self.layers {
            hidden = self
                .dropout
                .forward(layer.forward(hidden, input.reverse.clone()));
        }

        hidden
    }
}

/// One bidirectional LSTM layer
#[derive(Module, Debug)]
pub struct BiLstm<B: Backend> {
    /// Reads each sentence from its first token
    pub left_to_right: Lstm<B>,

    /// Reads each sentence from its last real token
    pub right_to_left: Lstm<B>,
}

impl<B: Backend> BiLstm<B> {
    /// Run both directions and concatenate their hidden states
    ///
    /// `reverse` is a per-sentence permutation `[batch_size, seq_length, seq_length]` that flips
    /// the real positions of each sentence and leaves its padding in place, so the right-to-left
    /// pass starts at the last real token.
    pub fn forward(&self, input: Tensor<B, 3>, reverse: Tensor<B, 3>) -> Tensor<B, 3> {
        let (_, forward) = self.left_to_right.forward(input.clone(), None);

        let reversed = reverse.clone().matmul(input);
        let (_, backward) = self.right_to_left.forward(reversed, None);

        Tensor::cat(vec![forward, reverse.matmul(backward)], 2)
    }
}

/// Reduces each word's characters to a fixed-size vector
#[derive(Module, Debug)]
pub struct CharEncoder<B: Backend> {
    /// Recurrent character encoder
    pub lstm: Option<CharLstm<B>>,

    /// Convolutional character encoder
    pub cnn: Option<CharCnn<B>>,
}

impl<B: Backend> CharEncoder<B> {
    /// One `[batch_size * seq_length, d_chars]` representation per configured encoder
    pub fn forward(&self, characters: &Characters<B>) -> Vec<Tensor<B, 2>> {
        self.lstm
            .iter()
            .map(|lstm| lstm.forward(characters))
            .chain(self.cnn.iter().map(|cnn| cnn.forward(characters)))
            .collect()
    }
}

/// Character BiLSTM: the final state of each direction at the word's true length
#[derive(Module, Debug)]
pub struct CharLstm<B: Backend> {
    /// Character embedding
    pub embedding: Embedding<B>,
    /// Forward reader
    pub left_to_right: Lstm<B>,
    /// Backward reader, fed the reversed characters
    pub right_to_left: Lstm<B>,
    /// Hidden size per direction
    pub d_hidden: usize,
}

impl<B: Backend> CharLstm<B> {
    fn forward(&self, characters: &Characters<B>) -> Tensor<B, 2> {
        let [words, length] = characters.forward.dims();

        // One-hot over the last real character; all zeros for empty words
        let last = characters.last.clone().reshape([words, length, 1]);

        let (_, forward) = self
            .left_to_right
            .forward(self.embedding.forward(characters.forward.clone()), None);
        let (_, backward) = self
            .right_to_left
            .forward(self.embedding.forward(characters.backward.clone()), None);

        let forward = (forward * last.clone())
            .sum_dim(1)
            .reshape([words, self.d_hidden]);
        let backward = (backward * last).sum_dim(1).reshape([words, self.d_hidden]);

        Tensor::cat(vec![forward, backward], 1)
    }
}

/// Character CNN: convolution followed by max-pooling over the word
#[derive(Module, Debug)]
pub struct CharCnn<B: Backend> {
    /// Character embedding
    pub embedding: Embedding<B>,
    /// Convolution over the character axis
    pub conv: Conv1d<B>,
    /// Number of filters
    pub filters: usize,
}

impl<B: Backend> CharCnn<B> {
    fn forward(&self, characters: &Characters<B>) -> Tensor<B, 2> {
        let [words, _] = characters.forward.dims();

        let present = characters.last.clone().sum_dim(1);

        let embedded = self
            .embedding
            .forward(characters.forward.clone())
            .swap_dims(1, 2);

        let pooled = relu(self.conv.forward(embedded))
            .max_dim(2)
            .reshape([words, self.filters]);

        pooled * present
    }
}
