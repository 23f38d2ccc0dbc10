//! 2x2 stride-2 max-pooling layer. Carries no parameters and no activation.

use crate::errors::CnnResult;
use crate::kernels::pooling;
use crate::layers::ForwardOutput;
use crate::tensor::{Shape, Tensor};
use crate::types::ActivationKind;

fn ceil_div2(x: usize) -> usize {
    (x + 1) / 2
}

#[derive(Clone)]
pub struct PoolingLayer {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub activation: ActivationKind,
}

impl PoolingLayer {
    pub fn new(input_shape: Shape) -> Self {
        let output_shape = Shape::new(
            input_shape.n,
            input_shape.c,
            ceil_div2(input_shape.h),
            ceil_div2(input_shape.w),
        );
        Self {
            input_shape,
            output_shape,
            activation: ActivationKind::Identity,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> CnnResult<ForwardOutput> {
        let mut out = Tensor::new_zeroed(
            self.output_shape.n,
            self.output_shape.c,
            self.output_shape.h,
            self.output_shape.w,
        );
        pooling::pool_forward(x, &mut out)?;
        Ok(ForwardOutput { z: out.clone(), a: out })
    }

    /// Pooling has no pre-activation/post-activation distinction, so `z`
    /// passed in from `Network` is unused here; the max-position lookup
    /// needs the cached forward input `x` instead, which this clones before
    /// mutating in place, since the network may still hold other references
    /// to the cached activation it came from.
    pub fn backward(&mut self, x: &Tensor, dy: &Tensor) -> CnnResult<Tensor> {
        let mut x_owned = x.clone();
        pooling::pool_backward_in_place(&mut x_owned, dy)?;
        Ok(x_owned)
    }
}
