//! Event-ID embedding table

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// Dense embedding of event IDs: row `i` is the vector for ID `i`.
///
/// Callers must have validated IDs against the vocabulary bound before
/// lookup; the table itself indexes unchecked.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub(crate) weight: Array2<f32>,
}

impl Embedding {
    pub fn new(vocab: usize, dim: usize, rng: &mut StdRng) -> Self {
        let weight = Array2::from_shape_fn((vocab, dim), |_| {
            let v: f32 = rng.sample(StandardNormal);
            v * 0.1
        });
        Self { weight }
    }

    pub fn vocab(&self) -> usize {
        self.weight.nrows()
    }

    pub fn dim(&self) -> usize {
        self.weight.ncols()
    }

    /// Look up one timestep of IDs for a batch, producing a `batch x dim`
    /// matrix.
    pub(crate) fn lookup(&self, ids: ArrayView1<usize>) -> Array2<f32> {
        let mut out = Array2::zeros((ids.len(), self.dim()));
        for (row, &id) in ids.iter().enumerate() {
            out.row_mut(row).assign(&self.weight.row(id));
        }
        out
    }

    /// Scatter a timestep's input gradient back onto the table rows that
    /// produced it. Repeated IDs accumulate.
    pub(crate) fn scatter_grad(
        &self,
        ids: ArrayView1<usize>,
        grad_step: &Array2<f32>,
        grad_table: &mut Array2<f32>,
    ) {
        for (row, &id) in ids.iter().enumerate() {
            let mut dst = grad_table.row_mut(id);
            dst += &grad_step.row(row);
        }
    }
}
