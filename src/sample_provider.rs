//! The minimal sample-provider interface: something that can hand
//! back a full dataset as a single `(x, y)` tensor pair, which
//! `BatchCollection::from_dataset` then slices into mini-batches. Kept
//! deliberately narrow — anything from an in-memory array to a
//! file-backed loader can implement it.

use crate::errors::CnnResult;
use crate::tensor::Tensor;

pub trait SampleProvider {
    /// The full set of input samples, shape `(N, C, H, W)`.
    fn inputs(&self) -> &Tensor;
    /// The matching targets, shape `(N, ...)`.
    fn targets(&self) -> &Tensor;
    fn sample_count(&self) -> usize {
        self.inputs().shape().n
    }
}

/// The simplest possible provider: two tensors already resident in memory.
pub struct InMemoryProvider {
    inputs: Tensor,
    targets: Tensor,
}

impl InMemoryProvider {
    pub fn new(inputs: Tensor, targets: Tensor) -> CnnResult<Self> {
        if inputs.shape().n != targets.shape().n {
            return Err(crate::errors::CnnError::ShapeMismatch {
                expected: vec![inputs.shape().n],
                found: vec![targets.shape().n],
            });
        }
        Ok(Self { inputs, targets })
    }
}

impl SampleProvider for InMemoryProvider {
    fn inputs(&self) -> &Tensor {
        &self.inputs
    }

    fn targets(&self) -> &Tensor {
        &self.targets
    }
}
