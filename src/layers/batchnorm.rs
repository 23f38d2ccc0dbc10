//! Batch-normalization layer: spatial or per-activation statistics,
//! followed by an activation. Carries running statistics and an iteration
//! counter so the cumulative-moving-average update factor `1/(1+iteration)`
//! is a per-layer construction parameter rather than a hidden global.

use crate::errors::CnnResult;
use crate::kernels::activation;
use crate::kernels::batchnorm::{self, BatchNormMode};
use crate::layers::{ForwardOutput, WeightedGradients};
use crate::tensor::{Shape, Tensor};
use crate::types::ActivationKind;

#[derive(Clone)]
pub struct BatchNormLayer {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub activation: ActivationKind,
    pub mode: BatchNormMode,
    pub gamma: Tensor,
    pub beta: Tensor,
    pub running_mean: Tensor,
    pub running_var: Tensor,
    cache_mean: Tensor,
    cache_var: Tensor,
    iteration: u64,
}

impl BatchNormLayer {
    pub fn new(input_shape: Shape, mode: BatchNormMode, activation: ActivationKind) -> Self {
        let param_shape = mode.param_shape(input_shape);
        let mut gamma = Tensor::new_zeroed(param_shape.n, param_shape.c, param_shape.h, param_shape.w);
        gamma.as_slice_mut().fill(1.0);
        Self {
            input_shape,
            output_shape: input_shape,
            activation,
            mode,
            gamma,
            beta: Tensor::new_zeroed(param_shape.n, param_shape.c, param_shape.h, param_shape.w),
            running_mean: Tensor::new_zeroed(param_shape.n, param_shape.c, param_shape.h, param_shape.w),
            running_var: Tensor::new_zeroed(param_shape.n, param_shape.c, param_shape.h, param_shape.w),
            cache_mean: Tensor::new_zeroed(param_shape.n, param_shape.c, param_shape.h, param_shape.w),
            cache_var: Tensor::new_zeroed(param_shape.n, param_shape.c, param_shape.h, param_shape.w),
            iteration: 0,
        }
    }

    /// Rebuilds a layer from its persisted parameters (`crate::io`), with a
    /// fresh zeroed cache and iteration counter — the next training step
    /// recomputes both before they're read.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        input_shape: Shape,
        output_shape: Shape,
        activation: ActivationKind,
        mode: BatchNormMode,
        gamma: Tensor,
        beta: Tensor,
        running_mean: Tensor,
        running_var: Tensor,
    ) -> Self {
        let param_shape = mode.param_shape(input_shape);
        Self {
            input_shape,
            output_shape,
            activation,
            mode,
            gamma,
            beta,
            running_mean,
            running_var,
            cache_mean: Tensor::new_zeroed(param_shape.n, param_shape.c, param_shape.h, param_shape.w),
            cache_var: Tensor::new_zeroed(param_shape.n, param_shape.c, param_shape.h, param_shape.w),
            iteration: 0,
        }
    }

    pub fn forward(&mut self, x: &Tensor, training: bool) -> CnnResult<ForwardOutput> {
        let mut z = Tensor::like(x);
        if training {
            batchnorm::bn_forward_train(
                self.mode,
                x,
                &self.gamma,
                &self.beta,
                &mut self.running_mean,
                &mut self.running_var,
                self.iteration,
                &mut self.cache_mean,
                &mut self.cache_var,
                &mut z,
            )?;
            self.iteration += 1;
        } else {
            batchnorm::bn_forward_infer(
                self.mode,
                x,
                &self.gamma,
                &self.beta,
                &self.running_mean,
                &self.running_var,
                &mut z,
            )?;
        }
        let mut a = Tensor::like(&z);
        activation::forward(self.activation, &z, &mut a)?;
        Ok(ForwardOutput { z, a })
    }

    pub fn backward(
        &mut self,
        x: &Tensor,
        z: &Tensor,
        dy: &Tensor,
        need_dx: bool,
    ) -> CnnResult<WeightedGradients> {
        let mut dz = Tensor::like(z);
        activation::backward(self.activation, z, dy, &mut dz)?;

        let mut dx_full = Tensor::like(x);
        let mut d_weights = Tensor::like(&self.gamma);
        let mut d_biases = Tensor::like(&self.beta);
        batchnorm::bn_backward(
            self.mode,
            x,
            &self.gamma,
            &self.cache_mean,
            &self.cache_var,
            &dz,
            &mut dx_full,
            &mut d_weights,
            &mut d_biases,
        )?;

        Ok(WeightedGradients {
            dx: if need_dx { Some(dx_full) } else { None },
            d_weights,
            d_biases,
        })
    }
}
