//! Fully-connected (affine + activation) layer.

use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;

use crate::errors::CnnResult;
use crate::kernels::{activation, fc};
use crate::layers::{ForwardOutput, WeightedGradients};
use crate::tensor::{Shape, Tensor};
use crate::types::ActivationKind;

#[derive(Clone)]
pub struct FullyConnectedLayer {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub activation: ActivationKind,
    /// Shape `(in, out, 1, 1)`; see `kernels::fc` for the convention.
    pub weights: Tensor,
    /// Shape `(1, out, 1, 1)`.
    pub biases: Tensor,
}

impl FullyConnectedLayer {
    /// `batch_size` only seeds the shapes used at construction time; every
    /// call to `forward` re-validates against the actual input's `n`.
    pub fn new(batch_size: usize, in_size: usize, out_size: usize, activation: ActivationKind) -> Self {
        let scale = 1.0 / (in_size as f32).sqrt();
        let weights = Tensor::from_array4(
            ndarray::Array4::random((in_size, out_size, 1, 1), Normal::new(0.0, scale).unwrap()),
        );
        let biases = Tensor::new_zeroed(1, out_size, 1, 1);
        Self {
            input_shape: Shape::flat(batch_size, in_size),
            output_shape: Shape::flat(batch_size, out_size),
            activation,
            weights,
            biases,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> CnnResult<ForwardOutput> {
        let n = x.shape().n;
        let out_size = self.weights.shape().c;
        let mut z = Tensor::new_zeroed(n, out_size, 1, 1);
        fc::fc_forward(x, &self.weights, &self.biases, &mut z)?;
        let mut a = Tensor::like(&z);
        if self.activation == ActivationKind::Softmax {
            activation::softmax_forward(&z, &mut a)?;
        } else {
            activation::forward(self.activation, &z, &mut a)?;
        }
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

        let mut d_weights = Tensor::like(&self.weights);
        fc::fc_backward_weights(x, &dz, &mut d_weights)?;
        let mut d_biases = Tensor::like(&self.biases);
        fc::fc_backward_bias(&dz, &mut d_biases)?;

        let dx = if need_dx {
            let mut dx = Tensor::like(x);
            fc::fc_backward_data(&dz, &self.weights, &mut dx)?;
            Some(dx)
        } else {
            None
        };

        Ok(WeightedGradients {
            dx,
            d_weights,
            d_biases,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_applies_affine_then_activation() {
        let mut layer = FullyConnectedLayer::new(2, 2, 2, ActivationKind::Identity);
        layer.weights = Tensor::from_slice(&[1.0, 0.0, 0.0, 1.0], 2, 2, 1, 1).unwrap();
        layer.biases = Tensor::new_zeroed(1, 2, 1, 1);
        let x = Tensor::from_slice(&[1.0, 2.0, 3.0, 4.0], 2, 2, 1, 1).unwrap();
        let out = layer.forward(&x).unwrap();
        assert_eq!(out.a.as_slice(), x.as_slice());
    }

    #[test]
    fn backward_produces_gradients_with_matching_shapes() {
        let mut layer = FullyConnectedLayer::new(2, 2, 3, ActivationKind::Relu);
        let x = Tensor::from_slice(&[1.0, -1.0, 2.0, -2.0], 2, 2, 1, 1).unwrap();
        let out = layer.forward(&x).unwrap();
        let dy = Tensor::new_zeroed(2, 3, 1, 1);
        let grads = layer.backward(&x, &out.z, &dy, true).unwrap();
        assert_eq!(grads.d_weights.shape(), layer.weights.shape());
        assert_eq!(grads.d_biases.shape(), layer.biases.shape());
        assert_eq!(grads.dx.unwrap().shape(), x.shape());
    }
}
