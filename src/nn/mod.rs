//! Recurrent network building blocks
//!
//! Embedding table, memory cells, and the linear prediction head, each with
//! an explicit forward pass that caches what its backward pass needs. All
//! math is plain `ndarray`; batches are row-major (`batch x feature`).

pub mod activations;
pub mod cell;
pub mod embedding;
pub mod head;

pub use cell::MemoryCell;
pub use embedding::Embedding;
pub use head::DenseHead;
