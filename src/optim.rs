//! Gradient-based optimizers
//!
//! Optimizers operate on parallel lists of parameter and gradient tensors;
//! state (Adam moments) is keyed by position in that list and initialised
//! lazily on the first step, so the same optimizer works for any model
//! shape without registration.

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};

use crate::config::OptimizerKind;

pub trait Optimizer {
    /// Apply one update step. `params` and `grads` must be parallel, in a
    /// stable order across calls.
    fn step(&mut self, params: &mut [ArrayViewMutD<'_, f32>], grads: &[ArrayViewD<'_, f32>]);

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);
}

pub(crate) fn build_optimizer(kind: OptimizerKind, learning_rate: f32) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Adam => Box::new(Adam::new(learning_rate, 0.9, 0.999, 1e-8)),
        OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
    }
}

/// Adam with bias-corrected first and second moment estimates.
///
/// Kingma & Ba, "Adam: A method for stochastic optimization" (2014).
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// (first moment, second moment) per parameter tensor
    slots: Vec<(ArrayD<f32>, ArrayD<f32>)>,
    t: usize,
}

impl Adam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            slots: Vec::new(),
            t: 0,
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [ArrayViewMutD<'_, f32>], grads: &[ArrayViewD<'_, f32>]) {
        assert_eq!(
            params.len(),
            grads.len(),
            "parameter and gradient lists must be parallel"
        );

        if self.slots.len() != grads.len() {
            self.slots = grads
                .iter()
                .map(|g| (ArrayD::zeros(g.raw_dim()), ArrayD::zeros(g.raw_dim())))
                .collect();
        }

        self.t += 1;
        let correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let correction2 = 1.0 - self.beta2.powi(self.t as i32);

        let beta1 = self.beta1;
        let beta2 = self.beta2;
        let epsilon = self.epsilon;
        let lr = self.learning_rate;

        for ((param, grad), (m, v)) in params.iter_mut().zip(grads).zip(self.slots.iter_mut()) {
            Zip::from(param.view_mut())
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / correction1;
                    let v_hat = *v / correction2;
                    *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
                });
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}

/// Plain stochastic gradient descent.
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [ArrayViewMutD<'_, f32>], grads: &[ArrayViewD<'_, f32>]) {
        assert_eq!(
            params.len(),
            grads.len(),
            "parameter and gradient lists must be parallel"
        );

        let lr = self.learning_rate;
        for (param, grad) in params.iter_mut().zip(grads) {
            Zip::from(param.view_mut()).and(grad).for_each(|p, &g| {
                *p -= lr * g;
            });
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn one_step(opt: &mut dyn Optimizer, param: &mut ArrayD<f32>, grad: &ArrayD<f32>) {
        let mut params = vec![param.view_mut()];
        let grads = vec![grad.view()];
        opt.step(&mut params, &grads);
    }

    #[test]
    fn test_sgd_moves_against_gradient() {
        let mut opt = Sgd::new(0.1);
        let mut param = arr1(&[1.0f32, -1.0]).into_dyn();
        let grad = arr1(&[0.5f32, -0.5]).into_dyn();

        one_step(&mut opt, &mut param, &grad);

        assert!((param[[0]] - 0.95).abs() < 1e-6);
        assert!((param[[1]] + 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_adam_moves_against_gradient() {
        let mut opt = Adam::new(0.001, 0.9, 0.999, 1e-8);
        let mut param = arr1(&[1.0f32, 2.0, 3.0]).into_dyn();
        let grad = arr1(&[0.1f32, 0.2, 0.3]).into_dyn();

        let before = param.clone();
        one_step(&mut opt, &mut param, &grad);

        for i in 0..3 {
            assert!(param[[i]] < before[[i]]);
        }
    }

    #[test]
    fn test_adam_accumulates_state() {
        let mut opt = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let mut param = arr1(&[1.0f32]).into_dyn();
        let grad = arr1(&[1.0f32]).into_dyn();

        one_step(&mut opt, &mut param, &grad);
        assert_eq!(opt.t, 1);
        let after_first = param.clone();

        one_step(&mut opt, &mut param, &grad);
        assert_eq!(opt.t, 2);
        assert!(param[[0]] < after_first[[0]]);
    }

    #[test]
    fn test_adam_adapts_disparate_gradient_scales() {
        let mut opt = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let mut param = arr1(&[1.0f32, 1.0]).into_dyn();
        let grad = arr1(&[10.0f32, 0.01]).into_dyn();

        for _ in 0..5 {
            one_step(&mut opt, &mut param, &grad);
        }

        // Both coordinates move despite the 1000x gradient scale gap
        assert!(param[[0]] < 1.0);
        assert!(param[[1]] < 1.0);
    }

    #[test]
    fn test_learning_rate_accessors() {
        let mut opt = build_optimizer(OptimizerKind::Adam, 0.001);
        assert_eq!(opt.learning_rate(), 0.001);
        opt.set_learning_rate(0.01);
        assert_eq!(opt.learning_rate(), 0.01);
    }
}
