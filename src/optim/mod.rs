//! Optimizers: each owns whatever per-layer state its update rule needs
//! (momentum buffers, moving averages), keyed by layer index rather than
//! living on the layer itself or behind a shared/reference-counted cell —
//! every layer's state is a private entry in this optimizer's own map.

pub mod adadelta;
pub mod adagrad;
pub mod adam;
pub mod adamax;
pub mod momentum;
pub mod rmsprop;
pub mod sgd;

pub use adadelta::AdaDelta;
pub use adagrad::AdaGrad;
pub use adam::Adam;
pub use adamax::AdaMax;
pub use momentum::Momentum;
pub use rmsprop::RmsProp;
pub use sgd::Sgd;

use crate::tensor::Tensor;

/// A gradient-descent update rule. `step` is called once per weighted layer
/// per batch, identified by its `layer_index` so per-layer state can be
/// looked up or lazily initialized. `d_weights`/`d_biases` are summed across
/// the batch (see `kernels::conv::conv_backward_filter` and its
/// fully-connected counterpart), not averaged, so every implementation
/// divides by `batch_size` itself rather than assuming a pre-averaged
/// gradient.
pub trait Optimizer {
    #[allow(clippy::too_many_arguments)]
    fn step(
        &mut self,
        layer_index: usize,
        weights: &mut Tensor,
        biases: &mut Tensor,
        d_weights: &Tensor,
        d_biases: &Tensor,
        batch_size: usize,
    );
}

/// Turns a batch-summed gradient into the per-sample average every update
/// rule below is written against.
pub(crate) fn batch_average(grad: &Tensor, batch_size: usize) -> Tensor {
    let n = batch_size.max(1) as f32;
    Tensor::from_array4(grad.as_array4().mapv(|v| v / n))
}
