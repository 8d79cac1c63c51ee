//! Inference engines
//!
//! Batch mode scores every window in one pass against frozen parameters.
//! Online mode walks the test stream in order and interleaves prediction
//! with adaptation: each item is scored with the parameters as they existed
//! before its label was revealed, then a single-example gradient step folds
//! the label in. That predict-before-learn ordering is the engine's core
//! correctness contract — the true label of an item must never influence
//! its own prediction.

use ndarray::{s, Array2, ArrayView1};
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::OnlineConfig;
use crate::data::{check_labels, Dataset};
use crate::error::{EngineError, Result};
use crate::model::SequenceModel;
use crate::nn::activations::softmax;
use crate::optim::{build_optimizer, Optimizer};
use crate::train::learn_batch;

/// Top-k candidates for one window, ordered by descending confidence.
///
/// Confidences are softmax probabilities. Ties resolve toward the lower
/// event ID, so candidate order is deterministic for equal scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub candidates: Vec<usize>,
    pub confidences: Vec<f32>,
}

impl Prediction {
    /// Highest-scoring candidate.
    pub fn top(&self) -> usize {
        self.candidates[0]
    }

    /// Confidence of the highest-scoring candidate.
    pub fn confidence(&self) -> f32 {
        self.confidences[0]
    }
}

/// Select the `top` best candidates from one probability row.
fn top_k(probs: ArrayView1<'_, f32>, top: usize) -> Prediction {
    let mut ids: Vec<usize> = (0..probs.len()).collect();
    ids.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]).then(a.cmp(&b)));
    ids.truncate(top);

    let confidences = ids.iter().map(|&i| probs[i]).collect();
    Prediction {
        candidates: ids,
        confidences,
    }
}

/// Score every window against the current parameters. Items are mutually
/// independent and the model is untouched (`&SequenceModel`), so two calls
/// with the same input return identical predictions.
pub(crate) fn predict(
    model: &SequenceModel,
    windows: &Array2<usize>,
    top: usize,
) -> Result<Vec<Prediction>> {
    model.check_windows(windows.view())?;
    model.check_top(top)?;

    debug!(
        "batch inference: {} windows, top {}",
        windows.nrows(),
        top
    );

    let (logits, _) = model.forward(windows.view());
    let probs = softmax(&logits);

    Ok(probs.outer_iter().map(|row| top_k(row, top)).collect())
}

/// Sequential predict-then-learn engine.
///
/// Holds the model exclusively for the duration of the stream and owns a
/// fresh optimizer for the per-item updates; batch-training optimizer state
/// does not carry over.
pub struct OnlineEngine<'a> {
    model: &'a mut SequenceModel,
    optimizer: Box<dyn Optimizer>,
    config: OnlineConfig,
}

impl<'a> OnlineEngine<'a> {
    pub fn new(model: &'a mut SequenceModel, config: OnlineConfig) -> Result<Self> {
        config.validate()?;
        let optimizer = build_optimizer(config.optimizer, config.learning_rate);
        Ok(Self {
            model,
            optimizer,
            config,
        })
    }

    /// Process the test stream in original order. For each item i the state
    /// machine is: predict with current parameters, record, learn from
    /// `(x[i], y[i])`, advance. The model's parameters afterwards reflect
    /// adaptation to the whole stream.
    pub fn run(mut self, data: &Dataset, top: usize) -> Result<Vec<Prediction>> {
        if data.is_empty() {
            return Err(EngineError::EmptyDataset("test split"));
        }
        self.model.check_windows(data.windows().view())?;
        check_labels(data.labels().view(), self.model.config().output_dim)?;
        self.model.check_top(top)?;

        let n = data.len();
        info!("online inference: {} items, top {}", n, top);

        let mut predictions = Vec::with_capacity(n);
        for i in 0..n {
            let window = data.windows().slice(s![i..i + 1, ..]);

            // Predict before the label is observed
            let (logits, _) = self.model.forward(window);
            let probs = softmax(&logits);
            predictions.push(top_k(probs.row(0), top));

            // Single-example adaptation on the revealed label
            let label = [data.labels()[i]];
            let loss = learn_batch(
                self.model,
                self.optimizer.as_mut(),
                window,
                &label,
                self.config.clip,
            );
            if !loss.is_finite() {
                return Err(EngineError::NonFiniteLoss { epoch: 0, step: i });
            }
            trace!("online item {}: loss {:.6}", i, loss);
        }

        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use ndarray::{arr1, Array1};

    fn make_model() -> SequenceModel {
        let config = ModelConfig {
            input_dim: 8,
            embedding_dim: 4,
            hidden_dim: 3,
            output_dim: 8,
            cells: 2,
        };
        SequenceModel::seeded(config, 17).unwrap()
    }

    fn make_data(n: usize) -> Dataset {
        let x = Array2::from_shape_fn((n, 4), |(r, c)| (r * 2 + c) % 8);
        let y = Array1::from_shape_fn(n, |r| (r * 2 + 4) % 8);
        Dataset::new(x, y).unwrap()
    }

    #[test]
    fn test_top_k_orders_by_descending_score() {
        let probs = arr1(&[0.1f32, 0.5, 0.2, 0.15, 0.05]);
        let p = top_k(probs.view(), 3);

        assert_eq!(p.candidates, vec![1, 2, 3]);
        assert_eq!(p.confidences, vec![0.5, 0.2, 0.15]);
        assert_eq!(p.top(), 1);
        assert!((p.confidence() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_top_k_ties_resolve_to_lower_id() {
        let probs = arr1(&[0.25f32, 0.25, 0.25, 0.25]);
        let p = top_k(probs.view(), 4);
        assert_eq!(p.candidates, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_predict_is_idempotent() {
        let model = make_model();
        let data = make_data(5);

        let a = model.predict(data.windows(), 3).unwrap();
        let b = model.predict(data.windows(), 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_predict_does_not_mutate_model() {
        let model = make_model();
        let snapshot = model.clone();
        let data = make_data(5);

        model.predict(data.windows(), 2).unwrap();
        assert_eq!(model, snapshot);
    }

    #[test]
    fn test_predict_confidences_descend_and_sum_below_one() {
        let model = make_model();
        let data = make_data(5);

        for p in model.predict(data.windows(), 4).unwrap() {
            for pair in p.confidences.windows(2) {
                assert!(pair[0] >= pair[1]);
            }
            assert!(p.confidences.iter().sum::<f32>() <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_predict_rejects_bad_top() {
        let model = make_model();
        let data = make_data(2);

        assert!(model.predict(data.windows(), 0).is_err());
        assert!(model.predict(data.windows(), 9).is_err());
    }

    #[test]
    fn test_online_adapts_parameters() {
        let mut model = make_model();
        let before = model.clone();
        let data = make_data(5);

        let predictions = model
            .predict_online(&data, 1, &OnlineConfig::default())
            .unwrap();

        assert_eq!(predictions.len(), 5);
        assert_ne!(model, before);
    }

    #[test]
    fn test_online_rejects_empty_stream() {
        let mut model = make_model();
        let data = Dataset::new(Array2::zeros((0, 4)), Array1::zeros(0)).unwrap();

        let err = model
            .predict_online(&data, 1, &OnlineConfig::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyDataset(_)));
    }

    #[test]
    fn test_online_prediction_ignores_own_label() {
        let data = make_data(6);

        // Same stream with the final label perturbed
        let mut labels_b = data.labels().clone();
        labels_b[5] = (labels_b[5] + 1) % 8;
        let data_b = Dataset::new(data.windows().clone(), labels_b).unwrap();

        let mut model_a = make_model();
        let mut model_b = make_model();
        let preds_a = model_a
            .predict_online(&data, 2, &OnlineConfig::default())
            .unwrap();
        let preds_b = model_b
            .predict_online(&data_b, 2, &OnlineConfig::default())
            .unwrap();

        // Identical history up to item 5, so its prediction is identical
        // even though its own label differs between the runs.
        assert_eq!(preds_a[5], preds_b[5]);
    }
}
