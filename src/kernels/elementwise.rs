//! Elementwise tensor kernels. Each one is data-parallel across samples via
//! `ndarray::Zip`, which (with the `rayon` feature, the crate default)
//! dispatches to a `par_for_each` over the outermost dimension.

use ndarray::Zip;

use crate::errors::CnnResult;
use crate::tensor::Tensor;

fn check_same_shape(a: &Tensor, b: &Tensor, out: &Tensor) -> CnnResult<()> {
    crate::kernels::require_shape_eq(a.shape(), b.shape())?;
    crate::kernels::require_shape_eq(a.shape(), out.shape())?;
    Ok(())
}

/// `Y = X1 - X2`.
pub fn subtract(a: &Tensor, b: &Tensor, out: &mut Tensor) -> CnnResult<()> {
    check_same_shape(a, b, out)?;
    let zip = Zip::from(out.as_array4_mut())
        .and(a.as_array4())
        .and(b.as_array4());
    #[cfg(feature = "rayon")]
    zip.par_for_each(|o, &x1, &x2| *o = x1 - x2);
    #[cfg(not(feature = "rayon"))]
    zip.for_each(|o, &x1, &x2| *o = x1 - x2);
    Ok(())
}

/// `Y = X1 ⊙ X2` (Hadamard product).
pub fn multiply_elementwise(a: &Tensor, b: &Tensor, out: &mut Tensor) -> CnnResult<()> {
    check_same_shape(a, b, out)?;
    let zip = Zip::from(out.as_array4_mut())
        .and(a.as_array4())
        .and(b.as_array4());
    #[cfg(feature = "rayon")]
    zip.par_for_each(|o, &x1, &x2| *o = x1 * x2);
    #[cfg(not(feature = "rayon"))]
    zip.for_each(|o, &x1, &x2| *o = x1 * x2);
    Ok(())
}
