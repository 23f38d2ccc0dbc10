//! Inception-style composite layer: several parallel branches (each an
//! ordinary chain of layers) consuming the same input, whose final outputs
//! are depth-concatenated and passed through a shared activation.
//!
//! This composite isn't in the distilled layer list but is a natural
//! supplement to the DAG design: real inception-style networks wire this up
//! as several single-parent chains converging on one depth-concat node. To
//! keep it a single `Layer` variant rather than forcing the outer `Network`
//! to understand nested sub-graphs, its branch sublayers' weights are
//! updated internally, with their own fixed learning rate, during
//! `backward` rather than being exposed to the outer optimizer — so from
//! the outer network's point of view this is a constant (unweighted) layer.

use crate::errors::CnnResult;
use crate::kernels::{activation, merge};
use crate::layers::{ForwardOutput, Layer};
use crate::tensor::{Shape, Tensor};
use crate::types::ActivationKind;

#[derive(Clone)]
pub struct InceptionLayer {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub activation: ActivationKind,
    pub branches: Vec<Vec<Layer>>,
    pub inner_learning_rate: f32,
    cache: Option<InceptionCache>,
}

#[derive(Clone)]
struct InceptionCache {
    /// Per branch, per sublayer: `(input, pre-activation)`.
    branch_ios: Vec<Vec<(Tensor, Tensor)>>,
    branch_output_shapes: Vec<Shape>,
}

impl InceptionLayer {
    pub fn new(input_shape: Shape, branches: Vec<Vec<Layer>>, activation: ActivationKind) -> CnnResult<Self> {
        let total_c: usize = branches
            .iter()
            .map(|b| b.last().map(|l| l.output_shape().c).unwrap_or(0))
            .sum();
        let sample_branch_shape = branches
            .first()
            .and_then(|b| b.last())
            .map(|l| l.output_shape())
            .unwrap_or(input_shape);
        let output_shape = Shape::new(input_shape.n, total_c, sample_branch_shape.h, sample_branch_shape.w);
        Ok(Self {
            input_shape,
            output_shape,
            activation,
            branches,
            inner_learning_rate: 0.01,
            cache: None,
        })
    }

    pub fn forward(&mut self, x: &Tensor, training: bool) -> CnnResult<ForwardOutput> {
        let mut branch_ios = Vec::with_capacity(self.branches.len());
        let mut branch_finals: Vec<Tensor> = Vec::with_capacity(self.branches.len());
        let mut branch_output_shapes = Vec::with_capacity(self.branches.len());

        for branch in self.branches.iter_mut() {
            let mut current = x.clone();
            let mut ios = Vec::with_capacity(branch.len());
            for layer in branch.iter_mut() {
                let out = layer.forward(&current, training)?;
                ios.push((current, out.z));
                current = out.a;
            }
            branch_output_shapes.push(current.shape());
            branch_finals.push(current);
            branch_ios.push(ios);
        }

        let refs: Vec<&Tensor> = branch_finals.iter().collect();
        let mut concat = Tensor::new_zeroed(
            self.output_shape.n,
            self.output_shape.c,
            self.output_shape.h,
            self.output_shape.w,
        );
        merge::depth_concat_forward(&refs, &mut concat)?;

        let mut a = Tensor::like(&concat);
        activation::forward(self.activation, &concat, &mut a)?;

        self.cache = Some(InceptionCache {
            branch_ios,
            branch_output_shapes,
        });

        Ok(ForwardOutput { z: concat, a })
    }

    pub fn backward(&mut self, x: &Tensor, z: &Tensor, dy: &Tensor) -> CnnResult<Tensor> {
        let mut dz = Tensor::like(z);
        activation::backward(self.activation, z, dy, &mut dz)?;

        let cache = self
            .cache
            .take()
            .expect("backward called before a matching forward");
        let branch_grads = merge::depth_concat_backward(&cache.branch_output_shapes, &dz)?;

        let mut dx_total = Tensor::new_zeroed(x.shape().n, x.shape().c, x.shape().h, x.shape().w);
        let branch_triples = self
            .branches
            .iter_mut()
            .zip(cache.branch_ios.into_iter())
            .zip(branch_grads.into_iter())
            .map(|((b, i), g)| (b, i, g));
        for (branch, ios, mut d_branch_out) in branch_triples {
            for (layer, (layer_x, layer_z)) in branch.iter_mut().zip(ios.into_iter()).rev() {
                if layer.is_weighted() {
                    let grads = layer.backward_weighted(&layer_x, &layer_z, &d_branch_out, true)?;
                    if let Some((w, b)) = layer.weights_mut() {
                        apply_sgd_step(w, &grads.d_weights, self.inner_learning_rate);
                        apply_sgd_step(b, &grads.d_biases, self.inner_learning_rate);
                    }
                    d_branch_out = grads.dx.expect("need_dx requested");
                } else {
                    d_branch_out = layer.backward_constant(&layer_x, &layer_z, &d_branch_out)?;
                }
            }
            let mut acc = dx_total.as_array4_mut();
            *acc += d_branch_out.as_array4();
        }

        Ok(dx_total)
    }
}

fn apply_sgd_step(param: &mut Tensor, grad: &Tensor, lr: f32) {
    let mut p = param.as_array4_mut();
    p.scaled_add(-lr, grad.as_array4());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::FullyConnectedLayer;

    #[test]
    fn output_channels_equal_sum_of_branch_channels() {
        let input_shape = Shape::new(2, 4, 1, 1);
        let branch_a = vec![Layer::FullyConnected(FullyConnectedLayer::new(
            2,
            4,
            3,
            ActivationKind::Relu,
        ))];
        let branch_b = vec![Layer::FullyConnected(FullyConnectedLayer::new(
            2,
            4,
            5,
            ActivationKind::Relu,
        ))];
        let layer = InceptionLayer::new(input_shape, vec![branch_a, branch_b], ActivationKind::Identity).unwrap();
        assert_eq!(layer.output_shape.c, 8);
    }

    #[test]
    fn forward_then_backward_produces_input_shaped_gradient() {
        let input_shape = Shape::new(2, 4, 1, 1);
        let branch_a = vec![Layer::FullyConnected(FullyConnectedLayer::new(
            2,
            4,
            3,
            ActivationKind::Relu,
        ))];
        let branch_b = vec![Layer::FullyConnected(FullyConnectedLayer::new(
            2,
            4,
            5,
            ActivationKind::Relu,
        ))];
        let mut layer =
            InceptionLayer::new(input_shape, vec![branch_a, branch_b], ActivationKind::Identity).unwrap();
        let x = Tensor::new_zeroed(2, 4, 1, 1);
        let out = layer.forward(&x, true).unwrap();
        let dy = Tensor::new_zeroed(2, 8, 1, 1);
        let dx = layer.backward(&x, &out.z, &dy).unwrap();
        assert_eq!(dx.shape(), x.shape());
    }
}
