//! Recurrent memory cell
//!
//! One LSTM-style cell with fused gate matrices: `w_ih` and `w_hh` stack the
//! input, forget, candidate, and output gates along the first axis, so one
//! matmul per source computes all four pre-activations. The forward pass
//! caches every gate activation and state needed to backpropagate through
//! the full window without recomputation.

use ndarray::{s, Array1, Array2, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

use super::activations::sigmoid;

/// One memory cell of the bank. Cells share the embedded input but own
/// their parameters, so each can settle on a different continuation
/// pattern during joint training.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCell {
    /// Input-to-hidden weights, `4H x E` (gate order: input, forget,
    /// candidate, output)
    pub(crate) w_ih: Array2<f32>,
    /// Hidden-to-hidden weights, `4H x H`
    pub(crate) w_hh: Array2<f32>,
    /// Gate biases, `4H`
    pub(crate) bias: Array1<f32>,
    hidden_dim: usize,
}

/// Per-step activations cached by the forward pass for BPTT.
#[derive(Debug, Clone)]
pub(crate) struct CellTrace {
    pub(crate) gate_i: Vec<Array2<f32>>,
    pub(crate) gate_f: Vec<Array2<f32>>,
    pub(crate) gate_g: Vec<Array2<f32>>,
    pub(crate) gate_o: Vec<Array2<f32>>,
    pub(crate) cells: Vec<Array2<f32>>,
    pub(crate) hiddens: Vec<Array2<f32>>,
}

/// Parameter gradients for one cell, shapes matching the cell's parameters.
#[derive(Debug, Clone)]
pub(crate) struct CellGradients {
    pub(crate) w_ih: Array2<f32>,
    pub(crate) w_hh: Array2<f32>,
    pub(crate) bias: Array1<f32>,
}

impl MemoryCell {
    pub fn new(input_dim: usize, hidden_dim: usize, rng: &mut StdRng) -> Self {
        let xavier = (2.0 / (input_dim + hidden_dim) as f32).sqrt();
        let dist = Uniform::new(-xavier, xavier);

        Self {
            w_ih: Array2::from_shape_fn((4 * hidden_dim, input_dim), |_| dist.sample(rng)),
            w_hh: Array2::from_shape_fn((4 * hidden_dim, hidden_dim), |_| dist.sample(rng)),
            bias: Array1::zeros(4 * hidden_dim),
            hidden_dim,
        }
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Run the recurrence over a full window of embedded steps
    /// (`steps[t]` is `batch x E`), starting from zero state. Returns the
    /// trace; the final hidden state is `trace.hiddens.last()`.
    pub(crate) fn forward(&self, steps: &[Array2<f32>]) -> CellTrace {
        let batch = steps[0].nrows();
        let h = self.hidden_dim;

        let mut trace = CellTrace {
            gate_i: Vec::with_capacity(steps.len()),
            gate_f: Vec::with_capacity(steps.len()),
            gate_g: Vec::with_capacity(steps.len()),
            gate_o: Vec::with_capacity(steps.len()),
            cells: Vec::with_capacity(steps.len()),
            hiddens: Vec::with_capacity(steps.len()),
        };

        let mut hidden = Array2::zeros((batch, h));
        let mut cell = Array2::<f32>::zeros((batch, h));

        for x_t in steps {
            let pre = x_t.dot(&self.w_ih.t()) + hidden.dot(&self.w_hh.t()) + &self.bias;

            let i = sigmoid(&pre.slice(s![.., 0..h]).to_owned());
            let f = sigmoid(&pre.slice(s![.., h..2 * h]).to_owned());
            let g = pre.slice(s![.., 2 * h..3 * h]).mapv(f32::tanh);
            let o = sigmoid(&pre.slice(s![.., 3 * h..4 * h]).to_owned());

            cell = &f * &cell + &i * &g;
            hidden = &o * &cell.mapv(f32::tanh);

            trace.gate_i.push(i);
            trace.gate_f.push(f);
            trace.gate_g.push(g);
            trace.gate_o.push(o);
            trace.cells.push(cell.clone());
            trace.hiddens.push(hidden.clone());
        }

        trace
    }

    /// Backpropagate through the whole window. `grad_last` is the loss
    /// gradient w.r.t. the final hidden state; `grad_steps[t]` accumulates
    /// the gradient w.r.t. the embedded input at step `t` (shared across
    /// cells, so the caller passes one buffer for the whole bank).
    pub(crate) fn backward(
        &self,
        steps: &[Array2<f32>],
        trace: &CellTrace,
        grad_last: &Array2<f32>,
        grad_steps: &mut [Array2<f32>],
    ) -> CellGradients {
        let batch = steps[0].nrows();
        let h = self.hidden_dim;

        let mut grads = CellGradients {
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        };

        let zero_state = Array2::<f32>::zeros((batch, h));
        let mut grad_hidden = grad_last.clone();
        let mut grad_cell = Array2::<f32>::zeros((batch, h));

        for t in (0..steps.len()).rev() {
            let c_prev = if t == 0 { &zero_state } else { &trace.cells[t - 1] };
            let h_prev = if t == 0 {
                &zero_state
            } else {
                &trace.hiddens[t - 1]
            };

            let tanh_c = trace.cells[t].mapv(f32::tanh);

            // h_t = o * tanh(c_t)
            let d_o = &grad_hidden * &tanh_c;
            grad_cell += &(&(&grad_hidden * &trace.gate_o[t]) * &tanh_c.mapv(|v| 1.0 - v * v));

            // c_t = f * c_{t-1} + i * g
            let d_i = &grad_cell * &trace.gate_g[t];
            let d_g = &grad_cell * &trace.gate_i[t];
            let d_f = &grad_cell * c_prev;
            let grad_cell_prev = &grad_cell * &trace.gate_f[t];

            // Through the gate nonlinearities to the pre-activations
            let da_i = &d_i * &trace.gate_i[t].mapv(|v| v * (1.0 - v));
            let da_f = &d_f * &trace.gate_f[t].mapv(|v| v * (1.0 - v));
            let da_g = &d_g * &trace.gate_g[t].mapv(|v| 1.0 - v * v);
            let da_o = &d_o * &trace.gate_o[t].mapv(|v| v * (1.0 - v));

            let mut da = Array2::<f32>::zeros((batch, 4 * h));
            da.slice_mut(s![.., 0..h]).assign(&da_i);
            da.slice_mut(s![.., h..2 * h]).assign(&da_f);
            da.slice_mut(s![.., 2 * h..3 * h]).assign(&da_g);
            da.slice_mut(s![.., 3 * h..4 * h]).assign(&da_o);

            grads.w_ih += &da.t().dot(&steps[t]);
            grads.w_hh += &da.t().dot(h_prev);
            grads.bias += &da.sum_axis(Axis(0));

            grad_steps[t] += &da.dot(&self.w_ih);
            grad_hidden = da.dot(&self.w_hh);
            grad_cell = grad_cell_prev;
        }

        grads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn make_steps(rng: &mut StdRng, t: usize, batch: usize, dim: usize) -> Vec<Array2<f32>> {
        let dist = Uniform::new(-1.0f32, 1.0);
        (0..t)
            .map(|_| Array2::from_shape_fn((batch, dim), |_| dist.sample(rng)))
            .collect()
    }

    fn final_hidden_sum(cell: &MemoryCell, steps: &[Array2<f32>]) -> f32 {
        let trace = cell.forward(steps);
        trace.hiddens.last().map(|h| h.sum()).unwrap_or(0.0)
    }

    #[test]
    fn test_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(11);
        let cell = MemoryCell::new(3, 4, &mut rng);
        let steps = make_steps(&mut rng, 5, 2, 3);

        let trace = cell.forward(&steps);

        assert_eq!(trace.hiddens.len(), 5);
        assert_eq!(trace.hiddens[4].shape(), &[2, 4]);
        assert_eq!(trace.cells[0].shape(), &[2, 4]);
    }

    #[test]
    fn test_forward_deterministic() {
        let mut rng = StdRng::seed_from_u64(11);
        let cell = MemoryCell::new(3, 4, &mut rng);
        let steps = make_steps(&mut rng, 4, 2, 3);

        let a = cell.forward(&steps);
        let b = cell.forward(&steps);
        assert_eq!(a.hiddens[3], b.hiddens[3]);
    }

    // Finite-difference check of the BPTT gradients against a sum-of-final-
    // hidden loss, on a cell small enough for f32 central differences.
    #[test]
    fn test_backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(42);
        let cell = MemoryCell::new(3, 2, &mut rng);
        let steps = make_steps(&mut rng, 3, 2, 3);

        let trace = cell.forward(&steps);
        let grad_last = Array2::ones((2, 2));
        let mut grad_steps: Vec<Array2<f32>> = steps
            .iter()
            .map(|s| Array2::zeros(s.raw_dim()))
            .collect();
        let grads = cell.backward(&steps, &trace, &grad_last, &mut grad_steps);

        let eps = 5e-2f32;
        let check = |analytic: f32, numeric: f32| {
            let tol = 5e-3 + 0.05 * analytic.abs().max(numeric.abs());
            assert!(
                (analytic - numeric).abs() < tol,
                "analytic {} vs numeric {}",
                analytic,
                numeric
            );
        };

        // Spot-check a handful of w_ih entries
        for &(r, c) in &[(0usize, 0usize), (3, 1), (5, 2), (7, 0)] {
            let mut plus = cell.clone();
            plus.w_ih[[r, c]] += eps;
            let mut minus = cell.clone();
            minus.w_ih[[r, c]] -= eps;

            let numeric =
                (final_hidden_sum(&plus, &steps) - final_hidden_sum(&minus, &steps)) / (2.0 * eps);
            check(grads.w_ih[[r, c]], numeric);
        }

        // And w_hh / bias entries
        for &(r, c) in &[(0usize, 0usize), (6, 1)] {
            let mut plus = cell.clone();
            plus.w_hh[[r, c]] += eps;
            let mut minus = cell.clone();
            minus.w_hh[[r, c]] -= eps;

            let numeric =
                (final_hidden_sum(&plus, &steps) - final_hidden_sum(&minus, &steps)) / (2.0 * eps);
            check(grads.w_hh[[r, c]], numeric);
        }

        for &r in &[0usize, 4] {
            let mut plus = cell.clone();
            plus.bias[r] += eps;
            let mut minus = cell.clone();
            minus.bias[r] -= eps;

            let numeric =
                (final_hidden_sum(&plus, &steps) - final_hidden_sum(&minus, &steps)) / (2.0 * eps);
            check(grads.bias[r], numeric);
        }
    }

    #[test]
    fn test_backward_input_gradient_finite_differences() {
        let mut rng = StdRng::seed_from_u64(43);
        let cell = MemoryCell::new(2, 2, &mut rng);
        let steps = make_steps(&mut rng, 2, 1, 2);

        let trace = cell.forward(&steps);
        let grad_last = Array2::ones((1, 2));
        let mut grad_steps: Vec<Array2<f32>> = steps
            .iter()
            .map(|s| Array2::zeros(s.raw_dim()))
            .collect();
        cell.backward(&steps, &trace, &grad_last, &mut grad_steps);

        let eps = 5e-2f32;
        for t in 0..2 {
            for c in 0..2 {
                let mut plus = steps.clone();
                plus[t][[0, c]] += eps;
                let mut minus = steps.clone();
                minus[t][[0, c]] -= eps;

                let numeric =
                    (final_hidden_sum(&cell, &plus) - final_hidden_sum(&cell, &minus)) / (2.0 * eps);
                let analytic = grad_steps[t][[0, c]];
                let tol = 5e-3 + 0.05 * analytic.abs().max(numeric.abs());
                assert!(
                    (analytic - numeric).abs() < tol,
                    "step {} col {}: analytic {} vs numeric {}",
                    t,
                    c,
                    analytic,
                    numeric
                );
            }
        }
    }
}
