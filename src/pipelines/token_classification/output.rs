use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};
use derive_new::new;

/// Training output of one batch
#[derive(new)]
pub struct Output<B: Backend> {
    /// The loss.
    pub loss: Tensor<B, 1>,

    /// The label scores: `[batch_size, seq_length, n_classes]`
    pub output: Tensor<B, 3>,

    /// The targets.
    pub targets: Tensor<B, 2, Int>,

    /// 1.0 where the position counts towards the loss
    pub mask: Tensor<B, 2>,
}

impl<B: Backend> Output<B> {
    /// Number of masked-in positions whose highest scoring label is the target
    pub fn correct(&self) -> usize {
        let [batch_size, seq_length, _] = self.output.dims();

        let hits = self
            .output
            .clone()
            .argmax(2)
            .reshape([batch_size, seq_length])
            .equal(self.targets.clone())
            .float();

        (hits * self.mask.clone())
            .sum()
            .into_scalar()
            .elem::<f32>()
            .round() as usize
    }

    /// The loss as a plain number
    pub fn loss_value(&self) -> f32 {
        self.loss.clone().into_scalar().elem::<f32>()
    }
}

/// Inference output without the loss and targets
#[derive(new)]
pub struct Inference<B: Backend> {
    /// Label distributions per head: `[batch_size, seq_length, n_classes]`
    pub probabilities: Vec<Tensor<B, 3>>,

    /// Pre-attention weights, if the model attends
    pub attention: Option<Tensor<B, 3>>,
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::tensors::{from_indexes, from_values};

    type TestBackend = NdArray;

    #[test]
    fn counts_correct_positions_inside_the_mask() {
        let device = Default::default();

        let output = Output::<TestBackend>::new(
            from_values(vec![0.5], [1], &device),
            from_values(vec![0.9, 0.1, 0.2, 0.8, 0.7, 0.3], [1, 3, 2], &device),
            from_indexes(vec![0, 1, 1], [1, 3], &device),
            from_values(vec![1.0, 1.0, 0.0], [1, 3], &device),
        );

        assert_eq!(output.correct(), 2);
        assert!((output.loss_value() - 0.5).abs() < 1e-6);
    }
}
