use burn::{prelude::*, tensor::cast::ToElement};

const EPSILON: f64 = 1e-8;

/// Mutual information objective, `H(c|x) + H(c)`.
///
/// `c` is the sampled one-hot code and `c_given_x` the recognition network's predicted
/// distribution, both `[batch, num_classes]`. Each entropy is the batch mean of
/// `-sum(log(p + eps) * c)` over the class axis.
pub fn mutual_info_loss<B: Backend>(c: Tensor<B, 2>, c_given_x: Tensor<B, 2>) -> Tensor<B, 1> {
    let conditional_entropy = (c_given_x.add_scalar(EPSILON).log() * c.clone())
        .sum_dim(1)
        .neg()
        .mean();
    let entropy = (c.clone().add_scalar(EPSILON).log() * c)
        .sum_dim(1)
        .neg()
        .mean();

    conditional_entropy + entropy
}

/// Fraction of sigmoid scores on the right side of 0.5 for a batch that is entirely real
/// (`real = true`) or entirely generated.
pub fn binary_accuracy<B: Backend>(scores: Tensor<B, 2>, real: bool) -> f32 {
    let hits = if real {
        scores.greater_elem(0.5)
    } else {
        scores.lower_equal_elem(0.5)
    };

    hits.float().mean().into_scalar().to_f32()
}
