//! Next-event prediction for security event streams
//!
//! Predicts the next categorical event (e.g. the next threat name seen for
//! a host) from a sliding window of prior events, using a bank of k
//! independently parameterised recurrent memory cells whose final hidden
//! states are concatenated into a linear prediction head.
//!
//! Two inference regimes share one trained model:
//! - batch: `predict` scores a held-out test set against frozen parameters;
//! - online: `predict_online` walks the test stream item by item,
//!   predicting each item before learning from its true label, so the
//!   model keeps adapting without ever leaking an item's label into its
//!   own prediction.
//!
//! The external loader collaborator owns raw log decoding, vocabulary
//! construction, and the train/test partition; it hands the engine
//! integer-encoded [`Dataset`] splits whose cardinality must match
//! [`ModelConfig::input_dim`].
//!
//! # Example
//! ```ignore
//! use threatseq::{Dataset, ModelConfig, OnlineConfig, SequenceModel, TrainConfig};
//!
//! let mut model = SequenceModel::new(ModelConfig::new(300, 128, 300, 4))?;
//! model.fit(&split.train, &TrainConfig::default())?;
//!
//! let predictions = model.predict(split.test.windows(), 3)?;
//! let effective = threatseq::effective_predictions(&predictions, labels)?;
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod model;
pub mod nn;
pub mod optim;
pub mod predict;
pub mod train;

pub use config::{ModelConfig, OnlineConfig, OptimizerKind, TrainConfig};
pub use data::{Dataset, Split};
pub use error::{EngineError, Result};
pub use eval::effective_predictions;
pub use model::SequenceModel;
pub use predict::{OnlineEngine, Prediction};
pub use train::{Trainer, TrainingReport};
