//! The general output layer: applies an activation and is paired with a
//! non-softmax cost (quadratic or cross-entropy). Like `SoftmaxOutputLayer`,
//! `backward` is a pass-through — `CostKind::cost_prime` has already folded
//! in the activation derivative where the cost contract calls for it.

use crate::errors::CnnResult;
use crate::kernels::activation;
use crate::layers::ForwardOutput;
use crate::tensor::{Shape, Tensor};
use crate::types::ActivationKind;

#[derive(Clone)]
pub struct OutputLayer {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub activation: ActivationKind,
}

impl OutputLayer {
    pub fn new(shape: Shape, activation: ActivationKind) -> Self {
        Self {
            input_shape: shape,
            output_shape: shape,
            activation,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> CnnResult<ForwardOutput> {
        let mut a = Tensor::like(x);
        activation::forward(self.activation, x, &mut a)?;
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
    fn forward_applies_sigmoid() {
        let mut layer = OutputLayer::new(Shape::new(1, 1, 1, 1), ActivationKind::Sigmoid);
        let x = Tensor::from_slice(&[0.0], 1, 1, 1, 1).unwrap();
        let out = layer.forward(&x).unwrap();
        assert!((out.a.as_slice()[0] - 0.5).abs() < 1e-6);
    }
}
