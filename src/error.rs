use thiserror::Error;

/// Errors surfaced by the prediction engine.
///
/// Every variant is detected at the boundary closest to its cause and
/// returned synchronously; nothing is caught or retried internally. After a
/// `NonFiniteLoss` the model's parameters are not guaranteed usable.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("event id {id} outside vocabulary of size {cardinality}")]
    OutOfVocabulary { id: usize, cardinality: usize },

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("non-finite loss at epoch {epoch}, step {step}")]
    NonFiniteLoss { epoch: usize, step: usize },

    #[error("empty dataset: {0}")]
    EmptyDataset(&'static str),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
