//! Network topologies built from `Layer`s: a simple linear `Sequential`
//! chain and a general `Dag` with merge nodes (sum / depth-concat) and
//! auxiliary training branches.

pub mod dag;
pub mod sequential;

pub use dag::{Dag, DagNode, NodeKind};
pub use sequential::Sequential;

use crate::cost::CostKind;
use crate::errors::CnnResult;
use crate::layers::Layer;
use crate::tensor::Tensor;

/// Everything a `Trainer` needs regardless of topology.
pub trait TrainableNetwork {
    fn forward(&mut self, x: &Tensor, training: bool) -> CnnResult<Tensor>;

    /// Runs forward, computes the cost against `y`, then backpropagates,
    /// returning the scalar cost and applying gradients to `update_fn` for
    /// every weighted layer (called with the layer's linear index, its
    /// freshly computed weight/bias gradients, and the batch size those
    /// gradients were summed over, i.e. `x.shape().n`).
    fn train_step(
        &mut self,
        x: &Tensor,
        y: &Tensor,
        cost: CostKind,
        update_fn: &mut dyn FnMut(usize, &mut Layer, &Tensor, &Tensor, usize),
    ) -> CnnResult<f32>;
}
