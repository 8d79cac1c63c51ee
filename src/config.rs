//! Engine configuration
//!
//! Three configuration surfaces: the model shape (`ModelConfig`), the batch
//! training run (`TrainConfig`), and the online predict-then-learn loop
//! (`OnlineConfig`). Defaults mirror the parameters the system ships with
//! in production (hidden 128, vocabulary 300, 4 memory cells, 10 epochs,
//! batch 128).

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Model shape configuration.
///
/// `input_dim` is the event vocabulary cardinality and must equal the
/// cardinality reported by the loader that encoded the stream; prediction
/// targets live in the same event space, so `output_dim` normally equals
/// `input_dim` as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Event vocabulary cardinality (valid IDs are `0..input_dim`)
    pub input_dim: usize,
    /// Dense embedding dimension per event ID
    pub embedding_dim: usize,
    /// Hidden state dimension of each memory cell
    pub hidden_dim: usize,
    /// Output vocabulary cardinality
    pub output_dim: usize,
    /// Number of concurrent memory cells (k)
    pub cells: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_dim: 300,
            embedding_dim: 300,
            hidden_dim: 128,
            output_dim: 300,
            cells: 4,
        }
    }
}

impl ModelConfig {
    /// Shorthand constructor matching the engine's external contract.
    ///
    /// The embedding dimension is tied to `input_dim`, the way the original
    /// deployment configures it.
    pub fn new(input_dim: usize, hidden_dim: usize, output_dim: usize, cells: usize) -> Self {
        Self {
            input_dim,
            embedding_dim: input_dim,
            hidden_dim,
            output_dim,
            cells,
        }
    }

    /// Validate dimensions before parameter allocation.
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 {
            return Err(EngineError::Config("input_dim must be at least 1".into()));
        }
        if self.embedding_dim == 0 {
            return Err(EngineError::Config("embedding_dim must be at least 1".into()));
        }
        if self.hidden_dim == 0 {
            return Err(EngineError::Config("hidden_dim must be at least 1".into()));
        }
        if self.output_dim == 0 {
            return Err(EngineError::Config("output_dim must be at least 1".into()));
        }
        if self.cells == 0 {
            return Err(EngineError::Config("cell count must be at least 1".into()));
        }
        Ok(())
    }
}

/// Optimizer selection for training and online adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Adam with bias-corrected moment estimates
    Adam,
    /// Plain stochastic gradient descent
    Sgd,
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Adam
    }
}

/// Batch training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Number of full passes over the training set; the engine runs exactly
    /// this many, with no early stopping
    pub epochs: usize,
    /// Mini-batch size; a final partial batch is processed as-is
    pub batch_size: usize,
    /// Shuffle example order each epoch
    pub shuffle: bool,
    /// Optimizer step size
    pub learning_rate: f32,
    /// Optimizer kind
    pub optimizer: OptimizerKind,
    /// Gradient values are clamped to `[-clip, clip]` before each step
    pub clip: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 128,
            shuffle: false,
            learning_rate: 0.001,
            optimizer: OptimizerKind::default(),
            clip: 5.0,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(EngineError::Config("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(EngineError::Config("batch_size must be at least 1".into()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(EngineError::Config(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if !self.clip.is_finite() || self.clip <= 0.0 {
            return Err(EngineError::Config(format!(
                "clip must be positive and finite, got {}",
                self.clip
            )));
        }
        Ok(())
    }
}

/// Online inference configuration.
///
/// Whether online adaptation reuses the batch learning rate is a deployment
/// decision; the default matches `TrainConfig` and `from_train` copies an
/// existing training configuration explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineConfig {
    /// Step size for the per-item gradient update
    pub learning_rate: f32,
    /// Optimizer kind for the per-item update
    pub optimizer: OptimizerKind,
    /// Gradient clamp, as in `TrainConfig`
    pub clip: f32,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self::from_train(&TrainConfig::default())
    }
}

impl OnlineConfig {
    /// Derive the online schedule from a training configuration.
    pub fn from_train(train: &TrainConfig) -> Self {
        Self {
            learning_rate: train.learning_rate,
            optimizer: train.optimizer,
            clip: train.clip,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(EngineError::Config(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if !self.clip.is_finite() || self.clip <= 0.0 {
            return Err(EngineError::Config(format!(
                "clip must be positive and finite, got {}",
                self.clip
            )));
        }
        Ok(())
    }
}
