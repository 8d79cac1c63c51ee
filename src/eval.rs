//! Top-k evaluation
//!
//! Downstream per-class metrics are computed over an "effective prediction"
//! array: whenever the true label appears anywhere in an item's top-k
//! candidates, the effective prediction is corrected to the true label;
//! otherwise it stays the top-1 candidate. Standard classification metrics
//! then reflect top-k accuracy without redefining the metric library.

use crate::error::{EngineError, Result};
use crate::predict::Prediction;

/// Apply the credit-for-any-of-k correction.
///
/// With k=1 no correction is possible and the result is the plain top-1
/// prediction per item.
pub fn effective_predictions(predictions: &[Prediction], labels: &[usize]) -> Result<Vec<usize>> {
    if predictions.len() != labels.len() {
        return Err(EngineError::ShapeMismatch {
            expected: predictions.len(),
            got: labels.len(),
        });
    }

    predictions
        .iter()
        .zip(labels)
        .map(|(prediction, &label)| {
            if prediction.candidates.is_empty() {
                return Err(EngineError::ShapeMismatch {
                    expected: 1,
                    got: 0,
                });
            }
            if prediction.candidates.contains(&label) {
                Ok(label)
            } else {
                Ok(prediction.candidates[0])
            }
        })
        .collect()
}
