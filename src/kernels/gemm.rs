//! Dense linear-algebra kernels: GEMM, transpose, and the vertical-sum
//! reduction used by convolution's backward-filter and by fully-connected's
//! backward-bias.

use ndarray::{Array2, ArrayView2};

use crate::errors::{CnnError, CnnResult};

/// `Y[i,j] = sum_q A[i,q] * B[q,j]`. Fails if `A`'s inner dimension doesn't
/// match `B`'s outer dimension, or if `out`'s shape doesn't match (n, k).
#[tracing::instrument(skip_all, name = "kernel_gemm")]
pub fn multiply(a: ArrayView2<f32>, b: ArrayView2<f32>, out: &mut Array2<f32>) -> CnnResult<()> {
    let (n, l) = a.dim();
    let (l2, k) = b.dim();
    if l != l2 {
        return Err(CnnError::InvalidArgument(format!(
            "gemm: A's inner dim {l} does not match B's outer dim {l2}"
        )));
    }
    if out.dim() != (n, k) {
        return Err(CnnError::ShapeMismatch {
            expected: vec![n, k],
            found: vec![out.dim().0, out.dim().1],
        });
    }
    out.assign(&a.dot(&b));
    Ok(())
}

/// `Y[j,i] = X[i,j]`.
pub fn transpose(x: ArrayView2<f32>, out: &mut Array2<f32>) -> CnnResult<()> {
    let (rows, cols) = x.dim();
    if out.dim() != (cols, rows) {
        return Err(CnnError::ShapeMismatch {
            expected: vec![cols, rows],
            found: vec![out.dim().0, out.dim().1],
        });
    }
    out.assign(&x.t());
    Ok(())
}

/// `Y[j] = sum_i X[i,j]`; `out` must be shape (1, length).
pub fn compress_vertically(x: ArrayView2<f32>, out: &mut Array2<f32>) -> CnnResult<()> {
    let (_, len) = x.dim();
    if out.dim() != (1, len) {
        return Err(CnnError::ShapeMismatch {
            expected: vec![1, len],
            found: vec![out.dim().0, out.dim().1],
        });
    }
    let sums = x.sum_axis(ndarray::Axis(0));
    out.row_mut(0).assign(&sums);
    Ok(())
}
