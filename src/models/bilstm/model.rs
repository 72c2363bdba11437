use burn::{
    module::Module,
    nn::Linear,
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use crate::{
    pipelines::token_classification::{
        batcher::{Batch, Train},
        output::{Inference, Output},
    },
    utils::tensors,
};

use super::{
    attention::{FeatureAttention, TimeAttention},
    encoder::Encoder,
};

/// BiLSTM tagger with optional pre-attention and one output head per dataset
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    /// Embeddings and recurrent layers
    pub encoder: Encoder<B>,

    /// Time-wise pre-attention
    pub time_attention: Option<TimeAttention<B>>,

    /// Feature-wise pre-attention
    pub feature_attention: Option<FeatureAttention<B>>,

    /// Linear label projections, in dataset-name order
    pub heads: Vec<Linear<B>>,
}

/// Define model behavior
impl<B: Backend> Model<B> {
    /// Encode the batch and apply pre-attention, returning the weights when there are any
    pub fn attend(&self, input: &Batch<B>) -> (Tensor<B, 3>, Option<Tensor<B, 3>>) {
        let hidden = self.encoder.forward(input);

        if let Some(attention) = &self.time_attention {
            let (hidden, weights) = attention.forward(hidden, input.mask.clone());
            return (hidden, Some(weights));
        }

        if let Some(attention) = &self.feature_attention {
            let (hidden, weights) = attention.forward(hidden, input.mask.clone());
            return (hidden, Some(weights));
        }

        (hidden, None)
    }

    /// Defines forward pass for training
    pub fn forward(&self, item: Train<B>) -> Output<B> {
        let (hidden, _) = self.attend(&item.input);

        let output = self.heads[item.head].forward(hidden);

        let loss = tensors::masked_cross_entropy(
            output.clone(),
            item.targets.clone(),
            item.loss_mask.clone(),
            item.positions,
        );

        Output::new(loss, output, item.targets, item.loss_mask)
    }

    /// Defines forward pass for inference
    pub fn infer(&self, input: &Batch<B>) -> Inference<B> {
        let (hidden, attention) = self.attend(input);

        let probabilities = self
            .heads
            .iter()
            .map(|head| softmax(head.forward(hidden.clone()), 2))
            .collect();

        Inference::new(probabilities, attention)
    }

    /// Whether the model exposes attention weights
    pub fn attends(&self) -> bool {
        self.time_attention.is_some() || self.feature_attention.is_some()
    }
}
