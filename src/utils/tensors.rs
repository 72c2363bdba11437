use burn::tensor::{
    activation::log_softmax, backend::Backend, Data, ElementConversion, Int, Shape, Tensor,
};

/// Generate padding to a specific max length, so that every row of the batch shares a width
pub fn pad_to<B: Backend>(
    pad_token: usize,
    tokens_list: Vec<Vec<usize>>,
    seq_length: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let batch_size = tokens_list.len();

    let mut values = Vec::with_capacity(batch_size * seq_length);

    for tokens in tokens_list {
        let padding = seq_length.saturating_sub(tokens.len());

        values.extend(
            tokens
                .into_iter()
                .take(seq_length)
                .chain(std::iter::repeat(pad_token).take(padding))
                .map(|e| (e as i64).elem::<B::IntElem>()),
        );
    }

    Tensor::from_data(Data::new(values, Shape::new([batch_size, seq_length])), device)
}

/// Build a float tensor of the given shape from row-major values
pub fn from_values<B: Backend, const D: usize>(
    values: Vec<f32>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    let data = Data::new(values, Shape::new(shape)).convert::<B::FloatElem>();

    Tensor::from_data(data, device)
}

/// Build an int tensor of the given shape from row-major indexes
pub fn from_indexes<B: Backend, const D: usize>(
    indexes: Vec<usize>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D, Int> {
    let values = indexes
        .into_iter()
        .map(|index| (index as i64).elem::<B::IntElem>())
        .collect();

    Tensor::from_data(Data::new(values, Shape::new(shape)), device)
}

/// Read a float tensor back into row-major values
pub fn to_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().convert::<f32>().value
}

/// Read an int tensor back into row-major indexes
pub fn to_indexes<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Vec<usize> {
    tensor
        .into_data()
        .convert::<i64>()
        .value
        .into_iter()
        .map(|index| index.max(0) as usize)
        .collect()
}

/// Cross entropy averaged over the positions selected by a float mask
///
/// `logits`: `[batch_size, seq_length, n_classes]`, `targets` and `mask`:
/// `[batch_size, seq_length]`. Masked positions contribute neither loss nor gradient.
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    mask: Tensor<B, 2>,
    positions: usize,
) -> Tensor<B, 1> {
    let [batch_size, seq_length, _] = logits.dims();

    let log_probs = log_softmax(logits, 2)
        .gather(2, targets.reshape([batch_size, seq_length, 1]))
        .reshape([batch_size, seq_length]);

    (log_probs * mask)
        .sum()
        .neg()
        .div_scalar(positions.max(1) as f32)
}
