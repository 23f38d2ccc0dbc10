//! The softmax output layer, always paired with log-likelihood cost.
//!
//! The cost's `cost_prime` (see `crate::cost`) already differentiates
//! straight through the softmax Jacobian and produces `dX = y_hat - y` with
//! respect to this layer's pre-activation input, so this layer's `backward`
//! is a pass-through: the real work happened one level up, in the trainer's
//! call into `CostKind::cost_prime`.

use crate::errors::CnnResult;
use crate::kernels::activation;
use crate::layers::ForwardOutput;
use crate::tensor::{Shape, Tensor};

#[derive(Clone)]
pub struct SoftmaxOutputLayer {
    pub input_shape: Shape,
    pub output_shape: Shape,
}

impl SoftmaxOutputLayer {
    pub fn new(shape: Shape) -> Self {
        Self {
            input_shape: shape,
            output_shape: shape,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> CnnResult<ForwardOutput> {
        let mut a = Tensor::like(x);
        activation::softmax_forward(x, &mut a)?;
        Ok(ForwardOutput { z: x.clone(), a })
    }

    pub fn backward(&mut self, _z: &Tensor, dy: &Tensor) -> CnnResult<Tensor> {
        Ok(dy.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_rows_sum_to_one() {
        let mut layer = SoftmaxOutputLayer::new(Shape::new(1, 3, 1, 1));
        let x = Tensor::from_slice(&[1.0, 2.0, 3.0], 1, 3, 1, 1).unwrap();
        let out = layer.forward(&x).unwrap();
        let sum: f32 = out.a.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}
