//! Layer holders: stateful wrappers around weights/biases (or no
//! parameters at all) exposing the uniform forward/backward/gradient
//! operations. `Layer` is a tagged-variant enum rather than a trait
//! object, which keeps the binary persistence format in `crate::io`
//! simple (one tag byte per layer) and keeps `Network` able to
//! special-case weighted vs. constant layers without downcasting.

pub mod activation;
pub mod batchnorm;
pub mod convolutional;
pub mod fully_connected;
pub mod inception;
pub mod output;
pub mod pooling;
pub mod softmax_output;

pub use activation::ActivationLayer;
pub use batchnorm::BatchNormLayer;
pub use convolutional::ConvolutionalLayer;
pub use fully_connected::FullyConnectedLayer;
pub use inception::InceptionLayer;
pub use output::OutputLayer;
pub use pooling::PoolingLayer;
pub use softmax_output::SoftmaxOutputLayer;

use crate::errors::CnnResult;
use crate::tensor::{Shape, Tensor};
use crate::types::ActivationKind;

/// Forward-pass result for any layer: the pre-activation value `z`
/// (threaded through backward) and the post-activation value `a`.
pub struct ForwardOutput {
    pub z: Tensor,
    pub a: Tensor,
}

/// Backward-pass result for a weighted layer.
pub struct WeightedGradients {
    /// `None` when the caller doesn't need the upstream gradient (first
    /// layer in the network).
    pub dx: Option<Tensor>,
    pub d_weights: Tensor,
    pub d_biases: Tensor,
}

/// The complete set of layer kinds this crate implements.
pub enum Layer {
    FullyConnected(FullyConnectedLayer),
    Convolutional(ConvolutionalLayer),
    Pooling(PoolingLayer),
    BatchNorm(BatchNormLayer),
    Activation(ActivationLayer),
    SoftmaxOutput(SoftmaxOutputLayer),
    Output(OutputLayer),
    Inception(InceptionLayer),
}

impl Layer {
    pub fn input_shape(&self) -> Shape {
        match self {
            Layer::FullyConnected(l) => l.input_shape,
            Layer::Convolutional(l) => l.input_shape,
            Layer::Pooling(l) => l.input_shape,
            Layer::BatchNorm(l) => l.input_shape,
            Layer::Activation(l) => l.input_shape,
            Layer::SoftmaxOutput(l) => l.input_shape,
            Layer::Output(l) => l.input_shape,
            Layer::Inception(l) => l.input_shape,
        }
    }

    pub fn output_shape(&self) -> Shape {
        match self {
            Layer::FullyConnected(l) => l.output_shape,
            Layer::Convolutional(l) => l.output_shape,
            Layer::Pooling(l) => l.output_shape,
            Layer::BatchNorm(l) => l.output_shape,
            Layer::Activation(l) => l.output_shape,
            Layer::SoftmaxOutput(l) => l.output_shape,
            Layer::Output(l) => l.output_shape,
            Layer::Inception(l) => l.output_shape,
        }
    }

    pub fn activation(&self) -> ActivationKind {
        match self {
            Layer::FullyConnected(l) => l.activation,
            Layer::Convolutional(l) => l.activation,
            Layer::Pooling(l) => l.activation,
            Layer::BatchNorm(l) => l.activation,
            Layer::Activation(l) => l.activation,
            Layer::SoftmaxOutput(_) => ActivationKind::Softmax,
            Layer::Output(l) => l.activation,
            Layer::Inception(l) => l.activation,
        }
    }

    /// Whether this layer owns trainable parameters (weights/biases).
    pub fn is_weighted(&self) -> bool {
        matches!(
            self,
            Layer::FullyConnected(_) | Layer::Convolutional(_) | Layer::BatchNorm(_)
        )
    }

    pub fn forward(&mut self, x: &Tensor, training: bool) -> CnnResult<ForwardOutput> {
        match self {
            Layer::FullyConnected(l) => l.forward(x),
            Layer::Convolutional(l) => l.forward(x),
            Layer::Pooling(l) => l.forward(x),
            Layer::BatchNorm(l) => l.forward(x, training),
            Layer::Activation(l) => l.forward(x),
            Layer::SoftmaxOutput(l) => l.forward(x),
            Layer::Output(l) => l.forward(x),
            Layer::Inception(l) => l.forward(x, training),
        }
    }

    /// Backward for a weighted layer. Panics (a programming error) if
    /// called on a non-weighted layer; callers should branch on
    /// `is_weighted` first, the same way the trainer does.
    pub fn backward_weighted(
        &mut self,
        x: &Tensor,
        z: &Tensor,
        dy: &Tensor,
        need_dx: bool,
    ) -> CnnResult<WeightedGradients> {
        match self {
            Layer::FullyConnected(l) => l.backward(x, z, dy, need_dx),
            Layer::Convolutional(l) => l.backward(x, z, dy, need_dx),
            Layer::BatchNorm(l) => l.backward(x, z, dy, need_dx),
            _ => unreachable!("backward_weighted called on a non-weighted layer"),
        }
    }

    /// Backward for a constant (no-parameter) layer.
    pub fn backward_constant(&mut self, x: &Tensor, z: &Tensor, dy: &Tensor) -> CnnResult<Tensor> {
        match self {
            Layer::Pooling(l) => l.backward(x, dy),
            Layer::Activation(l) => l.backward(z, dy),
            Layer::SoftmaxOutput(l) => l.backward(z, dy),
            Layer::Output(l) => l.backward(z, dy),
            Layer::Inception(l) => l.backward(x, z, dy),
            _ => unreachable!("backward_constant called on a weighted layer"),
        }
    }

    pub fn weights_mut(&mut self) -> Option<(&mut Tensor, &mut Tensor)> {
        match self {
            Layer::FullyConnected(l) => Some((&mut l.weights, &mut l.biases)),
            Layer::Convolutional(l) => Some((&mut l.weights, &mut l.biases)),
            Layer::BatchNorm(l) => Some((&mut l.gamma, &mut l.beta)),
            _ => None,
        }
    }

    pub fn clone_layer(&self) -> Layer {
        match self {
            Layer::FullyConnected(l) => Layer::FullyConnected(l.clone()),
            Layer::Convolutional(l) => Layer::Convolutional(l.clone()),
            Layer::Pooling(l) => Layer::Pooling(l.clone()),
            Layer::BatchNorm(l) => Layer::BatchNorm(l.clone()),
            Layer::Activation(l) => Layer::Activation(l.clone()),
            Layer::SoftmaxOutput(l) => Layer::SoftmaxOutput(l.clone()),
            Layer::Output(l) => Layer::Output(l.clone()),
            Layer::Inception(l) => Layer::Inception(l.clone()),
        }
    }
}
