//! Convolutional (valid-convolution + activation) layer.

use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;

use crate::errors::CnnResult;
use crate::kernels::{activation, conv};
use crate::layers::{ForwardOutput, WeightedGradients};
use crate::tensor::{Shape, Tensor};
use crate::types::ActivationKind;

#[derive(Clone)]
pub struct ConvolutionalLayer {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub activation: ActivationKind,
    /// Shape `(K, C_in, kH, kW)`.
    pub weights: Tensor,
    /// Shape `(1, K, 1, 1)`.
    pub biases: Tensor,
}

impl ConvolutionalLayer {
    pub fn new(
        input_shape: Shape,
        num_filters: usize,
        kernel_h: usize,
        kernel_w: usize,
        activation: ActivationKind,
    ) -> CnnResult<Self> {
        let h_out = input_shape.h - kernel_h + 1;
        let w_out = input_shape.w - kernel_w + 1;
        let fan_in = (input_shape.c * kernel_h * kernel_w) as f32;
        let scale = 1.0 / fan_in.sqrt();
        let weights = Tensor::from_array4(ndarray::Array4::random(
            (num_filters, input_shape.c, kernel_h, kernel_w),
            Normal::new(0.0, scale).unwrap(),
        ));
        let biases = Tensor::new_zeroed(1, num_filters, 1, 1);
        Ok(Self {
            input_shape,
            output_shape: Shape::new(input_shape.n, num_filters, h_out, w_out),
            activation,
            weights,
            biases,
        })
    }

    pub fn forward(&mut self, x: &Tensor) -> CnnResult<ForwardOutput> {
        let (n, _c, h_in, w_in) = x.shape().as_tuple();
        let (k, _, kh, kw) = self.weights.shape().as_tuple();
        let mut z = Tensor::new_zeroed(n, k, h_in - kh + 1, w_in - kw + 1);
        conv::conv_forward(x, &self.weights, &self.biases, &mut z)?;
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

        let mut d_weights = Tensor::like(&self.weights);
        conv::conv_backward_filter(x, &dz, &mut d_weights)?;
        let mut d_biases = Tensor::like(&self.biases);
        conv::conv_backward_bias(&dz, &mut d_biases)?;

        let dx = if need_dx {
            let mut dx = Tensor::like(x);
            conv::conv_backward_data(&dz, &self.weights, &mut dx)?;
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
