//! Pure CPU reference kernels. Every kernel is deterministic given
//! identical input and writes its result into a caller-supplied output
//! argument. An alternate Implementation Provider (GPU, SIMD) can replace
//! any one of these while preserving the same shape contracts and numeric
//! semantics.

pub mod activation;
pub mod batchnorm;
pub mod conv;
pub mod elementwise;
pub mod fc;
pub mod gemm;
pub mod merge;
pub mod pooling;

use crate::errors::{CnnError, CnnResult};
use crate::tensor::Shape;

pub(crate) fn require_shape_eq(expected: Shape, found: Shape) -> CnnResult<()> {
    if expected != found {
        return Err(CnnError::ShapeMismatch {
            expected: expected.as_vec(),
            found: found.as_vec(),
        });
    }
    Ok(())
}
