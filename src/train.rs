//! Batch training engine
//!
//! Runs exactly the configured number of epochs over the training split —
//! no early stopping, no validation checkpoints. Each epoch partitions the
//! (optionally shuffled) example order into `batch_size` chunks; the final
//! partial chunk is trained as-is rather than dropped. A non-finite loss
//! aborts the run immediately and leaves the parameters unusable.

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::TrainConfig;
use crate::data::{check_labels, Dataset};
use crate::error::{EngineError, Result};
use crate::model::SequenceModel;
use crate::nn::activations::softmax;
use crate::optim::{build_optimizer, Optimizer};

/// Diagnostic record of one training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    /// Mean cross-entropy per epoch, in epoch order
    pub epoch_losses: Vec<f32>,
    /// Total examples processed across all epochs
    pub examples_seen: u64,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.epoch_losses.last().copied()
    }
}

/// Owns the optimizer for one training run and mutates the model in place.
pub struct Trainer<'a> {
    model: &'a mut SequenceModel,
    config: TrainConfig,
    optimizer: Box<dyn Optimizer>,
}

impl<'a> Trainer<'a> {
    pub fn new(model: &'a mut SequenceModel, config: TrainConfig) -> Result<Self> {
        config.validate()?;
        let optimizer = build_optimizer(config.optimizer, config.learning_rate);
        Ok(Self {
            model,
            config,
            optimizer,
        })
    }

    /// Run the full training schedule over `data`.
    pub fn fit(mut self, data: &Dataset) -> Result<TrainingReport> {
        if data.is_empty() {
            return Err(EngineError::EmptyDataset("training split"));
        }
        self.model.check_windows(data.windows().view())?;
        check_labels(data.labels().view(), self.model.config().output_dim)?;

        let n = data.len();
        let started = Utc::now();
        info!(
            "training started: {} examples, {} epochs, batch size {}",
            n, self.config.epochs, self.config.batch_size
        );

        let mut order: Vec<usize> = (0..n).collect();
        let mut epoch_losses = Vec::with_capacity(self.config.epochs);
        let mut examples_seen = 0u64;

        for epoch in 0..self.config.epochs {
            if self.config.shuffle {
                order.shuffle(&mut thread_rng());
            }

            let mut epoch_loss = 0.0f64;
            for (step, chunk) in order.chunks(self.config.batch_size).enumerate() {
                let (windows, labels) = gather_batch(data, chunk);
                let loss = learn_batch(
                    self.model,
                    self.optimizer.as_mut(),
                    windows.view(),
                    &labels,
                    self.config.clip,
                );
                if !loss.is_finite() {
                    return Err(EngineError::NonFiniteLoss { epoch, step });
                }
                epoch_loss += loss as f64 * chunk.len() as f64;
                examples_seen += chunk.len() as u64;
            }

            let mean_loss = (epoch_loss / n as f64) as f32;
            debug!(
                "epoch {}/{}: mean loss {:.6}",
                epoch + 1,
                self.config.epochs,
                mean_loss
            );
            epoch_losses.push(mean_loss);
        }

        let finished = Utc::now();
        info!(
            "training complete: {} examples seen, final loss {:.6}",
            examples_seen,
            epoch_losses.last().copied().unwrap_or(0.0)
        );

        Ok(TrainingReport {
            epoch_losses,
            examples_seen,
            started,
            finished,
        })
    }
}

/// Copy the selected examples into a contiguous batch.
fn gather_batch(data: &Dataset, idx: &[usize]) -> (Array2<usize>, Vec<usize>) {
    let len = data.window_len();
    let windows = Array2::from_shape_fn((idx.len(), len), |(r, c)| data.windows()[[idx[r], c]]);
    let labels = idx.iter().map(|&i| data.labels()[i]).collect();
    (windows, labels)
}

/// Mean cross-entropy over the batch and its gradient w.r.t. the logits.
pub(crate) fn cross_entropy_grad(logits: &Array2<f32>, labels: &[usize]) -> (f32, Array2<f32>) {
    let probs = softmax(logits);
    let batch = labels.len() as f32;

    let mut loss = 0.0f32;
    let mut grad = probs;
    for (row, &label) in labels.iter().enumerate() {
        loss -= grad[[row, label]].ln();
        grad[[row, label]] -= 1.0;
    }
    grad /= batch;

    (loss / batch, grad)
}

/// One forward/backward/update step. Returns the raw batch loss; the caller
/// decides how to surface a non-finite value. No parameter update is applied
/// when the loss is non-finite.
pub(crate) fn learn_batch(
    model: &mut SequenceModel,
    optimizer: &mut dyn Optimizer,
    windows: ArrayView2<usize>,
    labels: &[usize],
    clip: f32,
) -> f32 {
    let (logits, trace) = model.forward(windows);
    let (loss, grad_logits) = cross_entropy_grad(&logits, labels);
    if !loss.is_finite() {
        return loss;
    }

    let mut grads = model.backward(windows, &trace, &grad_logits);
    grads.clip(clip);

    let grad_views = grads.views();
    let mut param_views = model.param_views_mut();
    optimizer.step(&mut param_views, &grad_views);

    loss
}
