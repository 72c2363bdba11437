use burn::{
    module::Module,
    nn::Linear,
    tensor::{activation::softmax, backend::Backend, Tensor},
};

/// Bias added to the scores of padded keys before normalization
const MASKED: f32 = 1e9;

/// Time-wise pre-attention: every position attends over the real positions of its sentence
#[derive(Module, Debug)]
pub struct TimeAttention<B: Backend> {
    /// Query projection
    pub query: Linear<B>,
    /// Key projection
    pub key: Linear<B>,
    /// Energy projection of the additive score, absent for scaled dot products
    pub energy: Option<Linear<B>>,
    /// Projection size
    pub d_attention: usize,
}

impl<B: Backend> TimeAttention<B> {
    /// Re-weight the sequence
    ///
    /// `hidden`: `[batch_size, seq_length, d_model]`, `mask`: `[batch_size, seq_length]` with 1.0
    /// on real positions. Returns the attended sequence and the weights
    /// `[batch_size, seq_length, seq_length]`, each row a distribution over the real keys.
    pub fn forward(&self, hidden: Tensor<B, 3>, mask: Tensor<B, 2>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let [batch_size, seq_length, _] = hidden.dims();

        let query = self.query.forward(hidden.clone());
        let key = self.key.forward(hidden.clone());

        let scores = match &self.energy {
            None => query
                .matmul(key.swap_dims(1, 2))
                .div_scalar((self.d_attention as f32).sqrt()),
            Some(energy) => {
                let query = query
                    .reshape([batch_size, seq_length, 1, self.d_attention])
                    .repeat(2, seq_length);
                let key = key
                    .reshape([batch_size, 1, seq_length, self.d_attention])
                    .repeat(1, seq_length);

                energy
                    .forward((query + key).tanh())
                    .reshape([batch_size, seq_length, seq_length])
            }
        };

        let bias = mask
            .sub_scalar(1.0)
            .mul_scalar(MASKED)
            .reshape([batch_size, 1, seq_length])
            .repeat(1, seq_length);

        let weights = softmax(scores + bias, 2);

        (weights.clone().matmul(hidden), weights)
    }
}

/// Feature-wise pre-attention: softmax weights over the channels of the contextual vectors
#[derive(Module, Debug)]
pub struct FeatureAttention<B: Backend> {
    /// Score projection, or the hidden layer of the additive score
    pub projection: Linear<B>,
    /// Energy projection of the additive score
    pub energy: Option<Linear<B>>,
    /// One distribution per sentence instead of one per position
    pub shared: bool,
}

impl<B: Backend> FeatureAttention<B> {
    /// Rescale the channels
    ///
    /// Returns the rescaled sequence and the weights `[batch_size, seq_length, d_model]`.
    pub fn forward(&self, hidden: Tensor<B, 3>, mask: Tensor<B, 2>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let [batch_size, seq_length, d_model] = hidden.dims();

        let scores = match &self.energy {
            None => self.projection.forward(hidden.clone()),
            Some(energy) => energy.forward(self.projection.forward(hidden.clone()).tanh()),
        };

        let weights = if self.shared {
            let mask = mask.reshape([batch_size, seq_length, 1]);
            let lengths = mask.clone().sum_dim(1).clamp_min(1.0).repeat(2, d_model);

            let mean = (scores * mask.repeat(2, d_model)).sum_dim(1) / lengths;

            softmax(mean, 2).repeat(1, seq_length)
        } else {
            softmax(scores, 2)
        };

        (hidden * weights.clone(), weights)
    }
}
