//! Encoded event datasets
//!
//! The loader collaborator decodes raw event logs, builds the vocabulary,
//! and hands the engine integer-encoded sequence windows with next-event
//! labels, already partitioned into train/test. This module is the receiving
//! side of that contract: rectangular window/label storage plus the boundary
//! checks that keep the loader's vocabulary and the model's dimensions in
//! agreement.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{EngineError, Result};

/// One split of encoded examples: `x` holds one sequence window per row,
/// `y` the event ID immediately following each window.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Array2<usize>,
    y: Array1<usize>,
}

impl Dataset {
    /// Build a dataset from parallel window/label arrays.
    ///
    /// Fails with `ShapeMismatch` when the arrays disagree on the number of
    /// examples. Windows are rectangular by construction (`Array2`), so a
    /// ragged batch cannot be represented at all.
    pub fn new(x: Array2<usize>, y: Array1<usize>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(EngineError::ShapeMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }
        Ok(Self { x, y })
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Window length (events per example).
    pub fn window_len(&self) -> usize {
        self.x.ncols()
    }

    /// Sequence windows, one row per example.
    pub fn windows(&self) -> &Array2<usize> {
        &self.x
    }

    /// Next-event labels, parallel to `windows()`.
    pub fn labels(&self) -> &Array1<usize> {
        &self.y
    }

    /// Check every window ID against `input_dim` and every label against
    /// `output_dim`.
    pub fn validate(&self, input_dim: usize, output_dim: usize) -> Result<()> {
        check_ids(self.x.view(), input_dim)?;
        check_labels(self.y.view(), output_dim)
    }
}

/// Train/test partition as produced by the loader. The two splits are
/// disjoint; the partition ratio and any randomization belong to the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
}

impl Split {
    pub fn new(train: Dataset, test: Dataset) -> Self {
        Self { train, test }
    }
}

/// Reject the first window ID at or above the vocabulary bound.
pub(crate) fn check_ids(x: ArrayView2<usize>, cardinality: usize) -> Result<()> {
    for &id in x.iter() {
        if id >= cardinality {
            return Err(EngineError::OutOfVocabulary { id, cardinality });
        }
    }
    Ok(())
}

/// Reject the first label at or above the output bound.
pub(crate) fn check_labels(y: ArrayView1<usize>, cardinality: usize) -> Result<()> {
    for &id in y.iter() {
        if id >= cardinality {
            return Err(EngineError::OutOfVocabulary { id, cardinality });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn make_dataset() -> Dataset {
        let x = arr2(&[[0usize, 1, 2], [3, 4, 5]]);
        let y = arr1(&[6usize, 7]);
        Dataset::new(x, y).unwrap()
    }

    #[test]
    fn test_dataset_accessors() {
        let data = make_dataset();
        assert_eq!(data.len(), 2);
        assert_eq!(data.window_len(), 3);
        assert!(!data.is_empty());
    }

    #[test]
    fn test_dataset_rejects_mismatched_labels() {
        let x = arr2(&[[0usize, 1], [2, 3]]);
        let y = arr1(&[0usize]);
        let err = Dataset::new(x, y).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ShapeMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_validate_flags_out_of_vocabulary_window() {
        let data = make_dataset();
        assert!(data.validate(10, 10).is_ok());

        let err = data.validate(5, 10).unwrap_err();
        assert!(matches!(
            err,
            EngineError::OutOfVocabulary { id: 5, cardinality: 5 }
        ));
    }

    #[test]
    fn test_split_carries_both_partitions() {
        let train = make_dataset();
        let test = Dataset::new(arr2(&[[1usize, 2, 3]]), arr1(&[4usize])).unwrap();

        let split = Split::new(train.clone(), test);
        assert_eq!(split.train, train);
        assert_eq!(split.test.len(), 1);
    }

    #[test]
    fn test_validate_flags_out_of_vocabulary_label() {
        let data = make_dataset();
        let err = data.validate(10, 7).unwrap_err();
        assert!(matches!(
            err,
            EngineError::OutOfVocabulary { id: 7, cardinality: 7 }
        ));
    }
}
