//! Linear prediction head

use ndarray::{Array1, Array2, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

/// Projects the combined hidden representation to one logit per candidate
/// next event.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseHead {
    /// `output_dim x in_dim`
    pub(crate) weight: Array2<f32>,
    /// `output_dim`
    pub(crate) bias: Array1<f32>,
}

/// Head parameter gradients plus the gradient flowing back into the
/// combined hidden representation.
#[derive(Debug, Clone)]
pub(crate) struct HeadGradients {
    pub(crate) weight: Array2<f32>,
    pub(crate) bias: Array1<f32>,
    pub(crate) input: Array2<f32>,
}

impl DenseHead {
    pub fn new(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let xavier = (2.0 / (in_dim + out_dim) as f32).sqrt();
        let dist = Uniform::new(-xavier, xavier);

        Self {
            weight: Array2::from_shape_fn((out_dim, in_dim), |_| dist.sample(rng)),
            bias: Array1::zeros(out_dim),
        }
    }

    /// `batch x in_dim` -> `batch x output_dim` logits.
    pub(crate) fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        input.dot(&self.weight.t()) + &self.bias
    }

    pub(crate) fn backward(&self, input: &Array2<f32>, grad_logits: &Array2<f32>) -> HeadGradients {
        HeadGradients {
            weight: grad_logits.t().dot(input),
            bias: grad_logits.sum_axis(Axis(0)),
            input: grad_logits.dot(&self.weight),
        }
    }
}
