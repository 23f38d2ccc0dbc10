//! Batch normalization kernels, spatial and per-activation modes.
//!
//! Spatial mode computes one (mean, variance) pair per channel, pooling
//! over (N, H, W). Per-activation mode computes one pair per (H, W, C)
//! position, pooling only over N. Both share the same normalize/backward
//! math; only the grouping of elements into statistics differs.

use serde::{Deserialize, Serialize};

use crate::errors::{CnnError, CnnResult};
use crate::tensor::{Shape, Tensor};

pub const EPS: f32 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchNormMode {
    Spatial,
    PerActivation,
}

impl BatchNormMode {
    /// Shape of gamma/beta/running-mean/running-variance for an input of
    /// the given shape.
    pub fn param_shape(self, input: Shape) -> Shape {
        match self {
            BatchNormMode::Spatial => Shape::new(1, input.c, 1, 1),
            BatchNormMode::PerActivation => Shape::new(1, input.c, input.h, input.w),
        }
    }

    fn group_count(self, input: Shape) -> usize {
        match self {
            BatchNormMode::Spatial => input.c,
            BatchNormMode::PerActivation => input.c * input.h * input.w,
        }
    }

    fn group_size(self, input: Shape) -> usize {
        match self {
            BatchNormMode::Spatial => input.n * input.h * input.w,
            BatchNormMode::PerActivation => input.n,
        }
    }

    #[inline]
    fn group_of(self, input: Shape, c: usize, h: usize, w: usize) -> usize {
        match self {
            BatchNormMode::Spatial => c,
            BatchNormMode::PerActivation => c * input.h * input.w + h * input.w + w,
        }
    }

    #[inline]
    fn param_index(self, c: usize, h: usize, w: usize) -> (usize, usize, usize) {
        match self {
            BatchNormMode::Spatial => (c, 0, 0),
            BatchNormMode::PerActivation => (c, h, w),
        }
    }
}

fn check_param_shape(mode: BatchNormMode, input: Shape, param: Shape) -> CnnResult<()> {
    let expected = mode.param_shape(input);
    if expected != param {
        return Err(CnnError::ShapeMismatch {
            expected: expected.as_vec(),
            found: param.as_vec(),
        });
    }
    Ok(())
}

fn compute_mean_var(mode: BatchNormMode, x: &Tensor) -> (Vec<f32>, Vec<f32>) {
    let shape = x.shape();
    let g = mode.group_count(shape);
    let m = mode.group_size(shape) as f32;
    let mut mean = vec![0.0f32; g];
    let x_arr = x.as_array4();
    for n in 0..shape.n {
        for c in 0..shape.c {
            for h in 0..shape.h {
                for w in 0..shape.w {
                    mean[mode.group_of(shape, c, h, w)] += x_arr[[n, c, h, w]];
                }
            }
        }
    }
    for v in mean.iter_mut() {
        *v /= m;
    }

    let mut var = vec![0.0f32; g];
    for n in 0..shape.n {
        for c in 0..shape.c {
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let gi = mode.group_of(shape, c, h, w);
                    let d = x_arr[[n, c, h, w]] - mean[gi];
                    var[gi] += d * d;
                }
            }
        }
    }
    for v in var.iter_mut() {
        *v /= m;
    }
    (mean, var)
}

fn flatten_params(mode: BatchNormMode, shape: Shape, t: &Tensor) -> Vec<f32> {
    let g = mode.group_count(shape);
    let mut out = vec![0.0f32; g];
    let arr = t.as_array4();
    match mode {
        BatchNormMode::Spatial => {
            for c in 0..shape.c {
                out[c] = arr[[0, c, 0, 0]];
            }
        }
        BatchNormMode::PerActivation => {
            for c in 0..shape.c {
                for h in 0..shape.h {
                    for w in 0..shape.w {
                        out[mode.group_of(shape, c, h, w)] = arr[[0, c, h, w]];
                    }
                }
            }
        }
    }
    out
}

fn scatter_params(mode: BatchNormMode, shape: Shape, values: &[f32], t: &mut Tensor) {
    let arr = t.as_array4_mut();
    match mode {
        BatchNormMode::Spatial => {
            for c in 0..shape.c {
                arr[[0, c, 0, 0]] = values[c];
            }
        }
        BatchNormMode::PerActivation => {
            for c in 0..shape.c {
                for h in 0..shape.h {
                    for w in 0..shape.w {
                        arr[[0, c, h, w]] = values[mode.group_of(shape, c, h, w)];
                    }
                }
            }
        }
    }
}

fn normalize_into(
    mode: BatchNormMode,
    x: &Tensor,
    mean: &[f32],
    var: &[f32],
    gamma: &Tensor,
    beta: &Tensor,
    out: &mut Tensor,
) {
    let shape = x.shape();
    let gamma_flat = flatten_params(mode, shape, gamma);
    let beta_flat = flatten_params(mode, shape, beta);
    let x_arr = x.as_array4();
    let out_arr = out.as_array4_mut();
    for n in 0..shape.n {
        for c in 0..shape.c {
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let gi = mode.group_of(shape, c, h, w);
                    let xhat = (x_arr[[n, c, h, w]] - mean[gi]) / (var[gi] + EPS).sqrt();
                    out_arr[[n, c, h, w]] = gamma_flat[gi] * xhat + beta_flat[gi];
                }
            }
        }
    }
}

/// Training forward pass. Computes current batch statistics (written into
/// `cache_mean`/`cache_var` for backward to reuse), normalizes `x` into
/// `out`, and updates the running statistics with the cumulative moving
/// average factor `1/(1+iteration)`.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip_all, name = "kernel_batchnorm_forward_train")]
pub fn bn_forward_train(
    mode: BatchNormMode,
    x: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    running_mean: &mut Tensor,
    running_var: &mut Tensor,
    iteration: u64,
    cache_mean: &mut Tensor,
    cache_var: &mut Tensor,
    out: &mut Tensor,
) -> CnnResult<()> {
    let shape = x.shape();
    check_param_shape(mode, shape, gamma.shape())?;
    check_param_shape(mode, shape, beta.shape())?;
    check_param_shape(mode, shape, running_mean.shape())?;
    check_param_shape(mode, shape, running_var.shape())?;
    crate::kernels::require_shape_eq(shape, out.shape())?;

    let (mean, var) = compute_mean_var(mode, x);
    scatter_params(mode, shape, &mean, cache_mean);
    scatter_params(mode, shape, &var, cache_var);

    normalize_into(mode, x, &mean, &var, gamma, beta, out);

    let factor = 1.0 / (1.0 + iteration as f32);
    let prev_mean = flatten_params(mode, shape, running_mean);
    let prev_var = flatten_params(mode, shape, running_var);
    let new_mean: Vec<f32> = mean
        .iter()
        .zip(prev_mean.iter())
        .map(|(&m, &p)| factor * m + (1.0 - factor) * p)
        .collect();
    let new_var: Vec<f32> = var
        .iter()
        .zip(prev_var.iter())
        .map(|(&v, &p)| factor * v + (1.0 - factor) * p)
        .collect();
    scatter_params(mode, shape, &new_mean, running_mean);
    scatter_params(mode, shape, &new_var, running_var);
    Ok(())
}

/// Inference forward pass: normalizes using the stored running statistics.
pub fn bn_forward_infer(
    mode: BatchNormMode,
    x: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    running_mean: &Tensor,
    running_var: &Tensor,
    out: &mut Tensor,
) -> CnnResult<()> {
    let shape = x.shape();
    check_param_shape(mode, shape, gamma.shape())?;
    check_param_shape(mode, shape, beta.shape())?;
    check_param_shape(mode, shape, running_mean.shape())?;
    check_param_shape(mode, shape, running_var.shape())?;
    crate::kernels::require_shape_eq(shape, out.shape())?;

    let mean = flatten_params(mode, shape, running_mean);
    let var = flatten_params(mode, shape, running_var);
    normalize_into(mode, x, &mean, &var, gamma, beta, out);
    Ok(())
}

/// Backward pass: derives `dX`, `dGamma`, `dBeta` from the cached
/// per-group mean/variance of the matching forward call.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip_all, name = "kernel_batchnorm_backward")]
pub fn bn_backward(
    mode: BatchNormMode,
    x: &Tensor,
    gamma: &Tensor,
    cache_mean: &Tensor,
    cache_var: &Tensor,
    dy: &Tensor,
    dx: &mut Tensor,
    dgamma: &mut Tensor,
    dbeta: &mut Tensor,
) -> CnnResult<()> {
    let shape = x.shape();
    crate::kernels::require_shape_eq(shape, dy.shape())?;
    crate::kernels::require_shape_eq(shape, dx.shape())?;
    check_param_shape(mode, shape, gamma.shape())?;
    check_param_shape(mode, shape, dgamma.shape())?;
    check_param_shape(mode, shape, dbeta.shape())?;

    let g = mode.group_count(shape);
    let m = mode.group_size(shape) as f32;
    let mean = flatten_params(mode, shape, cache_mean);
    let var = flatten_params(mode, shape, cache_var);
    let gamma_flat = flatten_params(mode, shape, gamma);

    let mut sum_dy = vec![0.0f32; g];
    let mut sum_dy_xhat = vec![0.0f32; g];

    let x_arr = x.as_array4();
    let dy_arr = dy.as_array4();
    for n in 0..shape.n {
        for c in 0..shape.c {
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let gi = mode.group_of(shape, c, h, w);
                    let std = (var[gi] + EPS).sqrt();
                    let xhat = (x_arr[[n, c, h, w]] - mean[gi]) / std;
                    let dy_v = dy_arr[[n, c, h, w]];
                    sum_dy[gi] += dy_v;
                    sum_dy_xhat[gi] += dy_v * xhat;
                }
            }
        }
    }

    scatter_params(mode, shape, &sum_dy_xhat, dgamma);
    scatter_params(mode, shape, &sum_dy, dbeta);

    let dx_arr = dx.as_array4_mut();
    for n in 0..shape.n {
        for c in 0..shape.c {
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let gi = mode.group_of(shape, c, h, w);
                    let std = (var[gi] + EPS).sqrt();
                    let xhat = (x_arr[[n, c, h, w]] - mean[gi]) / std;
                    let dy_v = dy_arr[[n, c, h, w]];
                    dx_arr[[n, c, h, w]] = (gamma_flat[gi] / (m * std))
                        * (m * dy_v - sum_dy[gi] - xhat * sum_dy_xhat[gi]);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spatial_training_forward_normalizes_to_gamma_beta() {
        let shape = Shape::new(4, 2, 2, 2);
        let x = Tensor::from_slice(
            &(0..shape.size()).map(|v| v as f32).collect::<Vec<_>>(),
            shape.n,
            shape.c,
            shape.h,
            shape.w,
        )
        .unwrap();
        let mut gamma = Tensor::new_zeroed(1, 2, 1, 1);
        gamma.as_slice_mut().copy_from_slice(&[2.0, 3.0]);
        let mut beta = Tensor::new_zeroed(1, 2, 1, 1);
        beta.as_slice_mut().copy_from_slice(&[1.0, -1.0]);
        let mut running_mean = Tensor::new_zeroed(1, 2, 1, 1);
        let mut running_var = Tensor::new_zeroed(1, 2, 1, 1);
        let mut cache_mean = Tensor::new_zeroed(1, 2, 1, 1);
        let mut cache_var = Tensor::new_zeroed(1, 2, 1, 1);
        let mut out = Tensor::new_zeroed(shape.n, shape.c, shape.h, shape.w);

        bn_forward_train(
            BatchNormMode::Spatial,
            &x,
            &gamma,
            &beta,
            &mut running_mean,
            &mut running_var,
            0,
            &mut cache_mean,
            &mut cache_var,
            &mut out,
        )
        .unwrap();

        // Per-channel mean of the *output* should equal beta, and variance
        // should equal gamma^2, within tolerance.
        let out_arr = out.as_array4();
        for c in 0..2 {
            let mut sum = 0.0f32;
            let mut count = 0usize;
            for n in 0..4 {
                for h in 0..2 {
                    for w in 0..2 {
                        sum += out_arr[[n, c, h, w]];
                        count += 1;
                    }
                }
            }
            let mean = sum / count as f32;
            let expected_beta = if c == 0 { 1.0 } else { -1.0 };
            assert!((mean - expected_beta).abs() < 1e-3, "channel {c} mean {mean}");
        }
    }

    #[test]
    fn running_stats_update_with_cma_factor() {
        let shape = Shape::new(2, 1, 1, 1);
        let x = Tensor::from_slice(&[1.0, 3.0], 2, 1, 1, 1).unwrap();
        let gamma = {
            let mut t = Tensor::new_zeroed(1, 1, 1, 1);
            t.as_slice_mut()[0] = 1.0;
            t
        };
        let beta = Tensor::new_zeroed(1, 1, 1, 1);
        let mut running_mean = Tensor::new_zeroed(1, 1, 1, 1);
        let mut running_var = Tensor::new_zeroed(1, 1, 1, 1);
        let mut cache_mean = Tensor::new_zeroed(1, 1, 1, 1);
        let mut cache_var = Tensor::new_zeroed(1, 1, 1, 1);
        let mut out = Tensor::new_zeroed(shape.n, shape.c, shape.h, shape.w);
        bn_forward_train(
            BatchNormMode::Spatial,
            &x,
            &gamma,
            &beta,
            &mut running_mean,
            &mut running_var,
            0,
            &mut cache_mean,
            &mut cache_var,
            &mut out,
        )
        .unwrap();
        // iteration 0 -> factor 1.0, running mean becomes the batch mean (2.0)
        assert!((running_mean.as_slice()[0] - 2.0).abs() < 1e-5);
    }
}
