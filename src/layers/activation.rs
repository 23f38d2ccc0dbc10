//! A bare activation layer: no parameters, `A = f(X)`. Useful between merge
//! nodes and the layers that consume them, where the activation isn't
//! already folded into a weighted layer.

use crate::errors::CnnResult;
use crate::kernels::activation;
use crate::layers::ForwardOutput;
use crate::tensor::{Shape, Tensor};
use crate::types::ActivationKind;

#[derive(Clone)]
pub struct ActivationLayer {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub activation: ActivationKind,
}

impl ActivationLayer {
    pub fn new(shape: Shape, activation: ActivationKind) -> Self {
        Self {
            input_shape: shape,
            output_shape: shape,
            activation,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> CnnResult<ForwardOutput> {
        let mut a = Tensor::like(x);
        if self.activation == ActivationKind::Softmax {
            activation::softmax_forward(x, &mut a)?;
        } else {
            activation::forward(self.activation, x, &mut a)?;
        }
        Ok(ForwardOutput { z: x.clone(), a })
    }

    pub fn backward(&mut self, z: &Tensor, dy: &Tensor) -> CnnResult<Tensor> {
        let mut dx = Tensor::like(z);
        activation::backward(self.activation, z, dy, &mut dx)?;
        Ok(dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_layer_clamps_negatives() {
        let mut layer = ActivationLayer::new(Shape::new(1, 1, 2, 2), ActivationKind::Relu);
        let x = Tensor::from_slice(&[-1.0, 2.0, 0.0, 3.0], 1, 1, 2, 2).unwrap();
        let out = layer.forward(&x).unwrap();
        assert_eq!(out.a.as_slice(), &[0.0, 2.0, 0.0, 3.0]);
    }
}
