//! Sequence model: embedding, memory-cell bank, prediction head
//!
//! `SequenceModel` owns every trainable parameter. The k cells are held in
//! a runtime-sized `Vec` and all consume the same embedded window; their
//! final hidden states are concatenated before the head, so the head's
//! input width is `cells * hidden_dim`. Nothing here mutates parameters:
//! forward/backward produce logits and gradients, and only an optimizer
//! step (driven by the training or online engine) writes them back.

use ndarray::{s, Array1, Array2, ArrayView2, ArrayViewD, ArrayViewMutD};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{ModelConfig, OnlineConfig, TrainConfig};
use crate::data::{check_ids, Dataset};
use crate::error::{EngineError, Result};
use crate::nn::cell::{CellGradients, CellTrace};
use crate::nn::{DenseHead, Embedding, MemoryCell};
use crate::predict::{self, OnlineEngine, Prediction};
use crate::train::{Trainer, TrainingReport};

/// Multi-cell recurrent next-event predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceModel {
    config: ModelConfig,
    pub(crate) embedding: Embedding,
    pub(crate) cells: Vec<MemoryCell>,
    pub(crate) head: DenseHead,
}

/// Everything the backward pass needs from one forward pass.
pub(crate) struct ForwardTrace {
    /// Embedded input per timestep, `batch x embedding_dim`
    pub(crate) steps: Vec<Array2<f32>>,
    /// One trace per memory cell
    pub(crate) cell_traces: Vec<CellTrace>,
    /// Concatenated final hidden states, `batch x (cells * hidden_dim)`
    pub(crate) combined: Array2<f32>,
}

/// Gradients for every model parameter, in the same order as
/// `param_views_mut`.
pub(crate) struct Gradients {
    embedding: Array2<f32>,
    cells: Vec<CellGradients>,
    head_weight: Array2<f32>,
    head_bias: Array1<f32>,
}

impl Gradients {
    /// Clamp every gradient value to `[-limit, limit]`.
    pub(crate) fn clip(&mut self, limit: f32) {
        self.embedding.mapv_inplace(|v| v.clamp(-limit, limit));
        for cell in &mut self.cells {
            cell.w_ih.mapv_inplace(|v| v.clamp(-limit, limit));
            cell.w_hh.mapv_inplace(|v| v.clamp(-limit, limit));
            cell.bias.mapv_inplace(|v| v.clamp(-limit, limit));
        }
        self.head_weight.mapv_inplace(|v| v.clamp(-limit, limit));
        self.head_bias.mapv_inplace(|v| v.clamp(-limit, limit));
    }

    pub(crate) fn views(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut views = vec![self.embedding.view().into_dyn()];
        for cell in &self.cells {
            views.push(cell.w_ih.view().into_dyn());
            views.push(cell.w_hh.view().into_dyn());
            views.push(cell.bias.view().into_dyn());
        }
        views.push(self.head_weight.view().into_dyn());
        views.push(self.head_bias.view().into_dyn());
        views
    }
}

impl SequenceModel {
    /// Construct with randomly initialised parameters.
    pub fn new(config: ModelConfig) -> Result<Self> {
        Self::init(config, StdRng::from_entropy())
    }

    /// Construct with a fixed seed for reproducible initialisation.
    pub fn seeded(config: ModelConfig, seed: u64) -> Result<Self> {
        Self::init(config, StdRng::seed_from_u64(seed))
    }

    fn init(config: ModelConfig, mut rng: StdRng) -> Result<Self> {
        config.validate()?;

        let embedding = Embedding::new(config.input_dim, config.embedding_dim, &mut rng);
        let cells = (0..config.cells)
            .map(|_| MemoryCell::new(config.embedding_dim, config.hidden_dim, &mut rng))
            .collect();
        let head = DenseHead::new(
            config.cells * config.hidden_dim,
            config.output_dim,
            &mut rng,
        );

        Ok(Self {
            config,
            embedding,
            cells,
            head,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Train in place for exactly `config.epochs` passes over `data`.
    pub fn fit(&mut self, data: &Dataset, config: &TrainConfig) -> Result<TrainingReport> {
        Trainer::new(self, config.clone())?.fit(data)
    }

    /// Batch inference: top-`top` candidates with confidences for every
    /// window, without touching parameters.
    pub fn predict(&self, windows: &Array2<usize>, top: usize) -> Result<Vec<Prediction>> {
        predict::predict(self, windows, top)
    }

    /// Online inference: predict each test item with the current
    /// parameters, then learn from its true label before moving on. The
    /// parameters keep adapting for the whole stream; they differ from the
    /// pre-call state afterwards.
    pub fn predict_online(
        &mut self,
        data: &Dataset,
        top: usize,
        config: &OnlineConfig,
    ) -> Result<Vec<Prediction>> {
        OnlineEngine::new(self, config.clone())?.run(data, top)
    }

    /// Reject inputs the forward pass cannot take: zero windows, zero-length
    /// windows, or IDs outside the vocabulary.
    pub(crate) fn check_windows(&self, windows: ArrayView2<usize>) -> Result<()> {
        if windows.nrows() == 0 {
            return Err(EngineError::EmptyDataset("no sequence windows"));
        }
        if windows.ncols() == 0 {
            return Err(EngineError::EmptyDataset("zero-length sequence windows"));
        }
        check_ids(windows, self.config.input_dim)
    }

    pub(crate) fn check_top(&self, top: usize) -> Result<()> {
        if top == 0 || top > self.config.output_dim {
            return Err(EngineError::Config(format!(
                "top must be in 1..={}, got {}",
                self.config.output_dim, top
            )));
        }
        Ok(())
    }

    /// Forward a batch of validated windows, producing logits and the trace
    /// the backward pass consumes.
    pub(crate) fn forward(&self, windows: ArrayView2<usize>) -> (Array2<f32>, ForwardTrace) {
        let batch = windows.nrows();
        let length = windows.ncols();
        let h = self.config.hidden_dim;

        let steps: Vec<Array2<f32>> = (0..length)
            .map(|t| self.embedding.lookup(windows.column(t)))
            .collect();

        let cell_traces: Vec<CellTrace> = self.cells.iter().map(|c| c.forward(&steps)).collect();

        let mut combined = Array2::zeros((batch, self.cells.len() * h));
        for (c, trace) in cell_traces.iter().enumerate() {
            combined
                .slice_mut(s![.., c * h..(c + 1) * h])
                .assign(&trace.hiddens[length - 1]);
        }

        let logits = self.head.forward(&combined);

        (
            logits,
            ForwardTrace {
                steps,
                cell_traces,
                combined,
            },
        )
    }

    /// Backpropagate a logit gradient through head, cell bank, and
    /// embedding table.
    pub(crate) fn backward(
        &self,
        windows: ArrayView2<usize>,
        trace: &ForwardTrace,
        grad_logits: &Array2<f32>,
    ) -> Gradients {
        let h = self.config.hidden_dim;

        let head_grads = self.head.backward(&trace.combined, grad_logits);

        // The embedded input is shared by all cells, so their input
        // gradients accumulate into one buffer per timestep.
        let mut grad_steps: Vec<Array2<f32>> = trace
            .steps
            .iter()
            .map(|s| Array2::zeros(s.raw_dim()))
            .collect();

        let cell_grads: Vec<CellGradients> = self
            .cells
            .iter()
            .enumerate()
            .map(|(c, cell)| {
                let grad_last = head_grads.input.slice(s![.., c * h..(c + 1) * h]).to_owned();
                cell.backward(&trace.steps, &trace.cell_traces[c], &grad_last, &mut grad_steps)
            })
            .collect();

        let mut grad_embedding = Array2::zeros(self.embedding.weight.raw_dim());
        for (t, grad_step) in grad_steps.iter().enumerate() {
            self.embedding
                .scatter_grad(windows.column(t), grad_step, &mut grad_embedding);
        }

        Gradients {
            embedding: grad_embedding,
            cells: cell_grads,
            head_weight: head_grads.weight,
            head_bias: head_grads.bias,
        }
    }

    /// Mutable parameter views, in the same order as `Gradients::views`.
    pub(crate) fn param_views_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        let mut views = vec![self.embedding.weight.view_mut().into_dyn()];
        for cell in &mut self.cells {
            views.push(cell.w_ih.view_mut().into_dyn());
            views.push(cell.w_hh.view_mut().into_dyn());
            views.push(cell.bias.view_mut().into_dyn());
        }
        views.push(self.head.weight.view_mut().into_dyn());
        views.push(self.head.bias.view_mut().into_dyn());
        views
    }
}
