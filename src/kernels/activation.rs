//! Activation forward/backward kernels and the standalone softmax kernel.
//!
//! Softmax is *not* expressed as a composition of the scalar exponential
//! plus a normalization kernel at the layer level — it is one kernel that
//! computes `e^x` per element, accumulates a per-row sum, then divides.
//! `softmax_forward` below does exactly that in one pass per row.

use ndarray::Zip;

use crate::errors::CnnResult;
use crate::tensor::Tensor;
use crate::types::ActivationKind;

const LEAKY_RELU_ALPHA: f32 = 0.01;
const ELU_ALPHA: f32 = 1.0;

fn scalar(kind: ActivationKind, x: f32) -> f32 {
    match kind {
        ActivationKind::Identity => x,
        ActivationKind::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        ActivationKind::Tanh => x.tanh(),
        ActivationKind::Relu => x.max(0.0),
        ActivationKind::LeakyRelu => (LEAKY_RELU_ALPHA * x).max(x),
        ActivationKind::Elu => {
            if x > 0.0 {
                x
            } else {
                ELU_ALPHA * (x.exp() - 1.0)
            }
        }
        // Softmax's per-element forward is the bare exponential; the row
        // normalization happens in `softmax_forward`, not here.
        ActivationKind::Softmax => x.exp(),
    }
}

fn scalar_prime(kind: ActivationKind, x: f32) -> f32 {
    match kind {
        ActivationKind::Identity => 1.0,
        ActivationKind::Sigmoid => {
            let s = scalar(ActivationKind::Sigmoid, x);
            s * (1.0 - s)
        }
        ActivationKind::Tanh => {
            let t = x.tanh();
            1.0 - t * t
        }
        ActivationKind::Relu => {
            if x > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        ActivationKind::LeakyRelu => {
            if x > 0.0 {
                1.0
            } else {
                LEAKY_RELU_ALPHA
            }
        }
        ActivationKind::Elu => {
            if x > 0.0 {
                1.0
            } else {
                ELU_ALPHA * x.exp()
            }
        }
        // Softmax's Jacobian is not diagonal; layers that use softmax pair
        // it with log-likelihood, whose cost-prime writes dX = y_hat - y
        // directly and never calls this.
        ActivationKind::Softmax => 1.0,
    }
}

/// `Y[i] = f(X[i])`.
pub fn forward(kind: ActivationKind, x: &Tensor, out: &mut Tensor) -> CnnResult<()> {
    crate::kernels::require_shape_eq(x.shape(), out.shape())?;
    let zip = Zip::from(out.as_array4_mut()).and(x.as_array4());
    #[cfg(feature = "rayon")]
    zip.par_for_each(|o, &xi| *o = scalar(kind, xi));
    #[cfg(not(feature = "rayon"))]
    zip.for_each(|o, &xi| *o = scalar(kind, xi));
    Ok(())
}

/// `dX[i] = f'(X[i]) * dY[i]`.
pub fn backward(kind: ActivationKind, x: &Tensor, dy: &Tensor, dx: &mut Tensor) -> CnnResult<()> {
    crate::kernels::require_shape_eq(x.shape(), dy.shape())?;
    crate::kernels::require_shape_eq(x.shape(), dx.shape())?;
    let zip = Zip::from(dx.as_array4_mut())
        .and(x.as_array4())
        .and(dy.as_array4());
    #[cfg(feature = "rayon")]
    zip.par_for_each(|o, &xi, &dyi| *o = scalar_prime(kind, xi) * dyi);
    #[cfg(not(feature = "rayon"))]
    zip.for_each(|o, &xi, &dyi| *o = scalar_prime(kind, xi) * dyi);
    Ok(())
}

/// Row-wise softmax over the "entities x length" view: for every sample
/// row i, `Y[i,j] = e^(X[i,j]) / sum_k e^(X[i,k])`.
#[tracing::instrument(skip_all, name = "kernel_softmax")]
pub fn softmax_forward(x: &Tensor, out: &mut Tensor) -> CnnResult<()> {
    crate::kernels::require_shape_eq(x.shape(), out.shape())?;
    let x_view = x.as_entities();
    let mut out_view = out.as_entities_mut();
    for (row_in, mut row_out) in x_view.rows().into_iter().zip(out_view.rows_mut()) {
        let max = row_in.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for (o, &xi) in row_out.iter_mut().zip(row_in.iter()) {
            let e = (xi - max).exp();
            *o = e;
            sum += e;
        }
        for o in row_out.iter_mut() {
            *o /= sum;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_clamps_negatives() {
        let x = Tensor::from_slice(&[-1.0, 2.0, 0.0, 3.0], 1, 1, 2, 2).unwrap();
        let mut y = Tensor::new_zeroed(1, 1, 2, 2);
        forward(ActivationKind::Relu, &x, &mut y).unwrap();
        assert_eq!(y.as_slice(), &[0.0, 2.0, 0.0, 3.0]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let x = Tensor::from_slice(&[1.0, 2.0, 3.0], 1, 3, 1, 1).unwrap();
        let mut y = Tensor::new_zeroed(1, 3, 1, 1);
        softmax_forward(&x, &mut y).unwrap();
        let sum: f32 = y.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);

        let total: f32 = (1.0f32).exp() + (2.0f32).exp() + (3.0f32).exp();
        let expected = [(1.0f32).exp() / total, (2.0f32).exp() / total, (3.0f32).exp() / total];
        for (got, want) in y.as_slice().iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-5);
        }
    }

    #[test]
    fn sigmoid_backward_matches_scenario_5() {
        // Same scenario as the quadratic-cost-prime test: z = [2.197, -2.197].
        let z = Tensor::from_slice(&[2.197, -2.197], 1, 2, 1, 1).unwrap();
        let dy = Tensor::from_slice(&[1.0, 1.0], 1, 2, 1, 1).unwrap();
        let mut dx = Tensor::new_zeroed(1, 2, 1, 1);
        backward(ActivationKind::Sigmoid, &z, &dy, &mut dx).unwrap();
        let s0 = 1.0 / (1.0 + (-2.197f32).exp());
        assert!((dx.as_slice()[0] - s0 * (1.0 - s0)).abs() < 1e-5);
    }
}
