//! General DAG network: nodes are added in topological order (the builder
//! enforces this — every parent id must already exist), so forward walks
//! nodes front-to-back and backward walks them back-to-front with no
//! separate sort step.

use crate::cost::CostKind;
use crate::errors::{CnnError, CnnResult};
use crate::kernels::{activation, merge};
use crate::layers::Layer;
use crate::network::TrainableNetwork;
use crate::tensor::{Shape, Tensor};
use crate::types::{ActivationKind, NodeId};

pub enum NodeKind {
    /// The network's external input; has no parents.
    Input,
    /// An ordinary single-parent layer.
    Layer(Layer),
    /// Merge node: element-wise sum of all parents, then an activation.
    Sum { activation: ActivationKind },
    /// Merge node: channel-wise concatenation of all parents, then an
    /// activation.
    DepthConcat { activation: ActivationKind },
    /// Auxiliary-loss branch: a small chain of layers off some interior
    /// node, trained against the same target with its own cost, scaled by
    /// `aux_weight`, and otherwise invisible to the rest of the graph —
    /// no other node may take a `TrainingBranch` as a parent. Skipped
    /// entirely outside training.
    TrainingBranch {
        layers: Vec<Layer>,
        cost: CostKind,
        aux_weight: f32,
    },
}

pub struct DagNode {
    pub parents: Vec<NodeId>,
    pub kind: NodeKind,
}

struct NodeCache {
    z: Tensor,
    a: Tensor,
    /// For `Layer`, the layer's input. For `TrainingBranch`, the per-branch
    /// sublayer `(input, pre-activation)` chain.
    layer_input: Option<Tensor>,
    branch_ios: Vec<(Tensor, Tensor)>,
}

pub struct Dag {
    pub nodes: Vec<DagNode>,
    pub output: Option<NodeId>,
    cache: Vec<Option<NodeCache>>,
}

impl Dag {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            output: None,
            cache: Vec::new(),
        }
    }

    fn push(&mut self, parents: Vec<NodeId>, kind: NodeKind) -> CnnResult<NodeId> {
        for p in &parents {
            if p.0 >= self.nodes.len() {
                return Err(CnnError::InvalidArgument(format!(
                    "dag node references parent {} before it is defined",
                    p.0
                )));
            }
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(DagNode { parents, kind });
        Ok(id)
    }

    pub fn add_input(&mut self) -> NodeId {
        self.push(Vec::new(), NodeKind::Input).expect("input has no parents")
    }

    pub fn add_layer(&mut self, layer: Layer, parent: NodeId) -> CnnResult<NodeId> {
        self.push(vec![parent], NodeKind::Layer(layer))
    }

    pub fn add_sum(&mut self, activation: ActivationKind, parents: Vec<NodeId>) -> CnnResult<NodeId> {
        if parents.len() < 2 {
            return Err(CnnError::InvalidArgument("sum node requires at least two parents".into()));
        }
        self.push(parents, NodeKind::Sum { activation })
    }

    pub fn add_depth_concat(&mut self, activation: ActivationKind, parents: Vec<NodeId>) -> CnnResult<NodeId> {
        if parents.len() < 2 {
            return Err(CnnError::InvalidArgument(
                "depth-concat node requires at least two parents".into(),
            ));
        }
        self.push(parents, NodeKind::DepthConcat { activation })
    }

    pub fn add_training_branch(
        &mut self,
        layers: Vec<Layer>,
        cost: CostKind,
        aux_weight: f32,
        parent: NodeId,
    ) -> CnnResult<NodeId> {
        self.push(vec![parent], NodeKind::TrainingBranch { layers, cost, aux_weight })
    }

    pub fn set_output(&mut self, node: NodeId) {
        self.output = Some(node);
    }

    fn run_forward(&mut self, x: &Tensor, training: bool) -> CnnResult<()> {
        self.cache = (0..self.nodes.len()).map(|_| None).collect();
        for i in 0..self.nodes.len() {
            let parents: Vec<NodeId> = self.nodes[i].parents.clone();
            let parent_activations: Vec<Tensor> = parents
                .iter()
                .map(|p| self.cache[p.0].as_ref().expect("parent computed before child").a.clone())
                .collect();

            match &mut self.nodes[i].kind {
                NodeKind::Input => {
                    self.cache[i] = Some(NodeCache {
                        z: x.clone(),
                        a: x.clone(),
                        layer_input: None,
                        branch_ios: Vec::new(),
                    });
                }
                NodeKind::Layer(layer) => {
                    let input = &parent_activations[0];
                    let out = layer.forward(input, training)?;
                    self.cache[i] = Some(NodeCache {
                        z: out.z,
                        a: out.a,
                        layer_input: Some(input.clone()),
                        branch_ios: Vec::new(),
                    });
                }
                NodeKind::Sum { activation } => {
                    let refs: Vec<&Tensor> = parent_activations.iter().collect();
                    let mut z = Tensor::like(&parent_activations[0]);
                    merge::sum_forward(&refs, &mut z)?;
                    let mut a = Tensor::like(&z);
                    activation::forward(*activation, &z, &mut a)?;
                    self.cache[i] = Some(NodeCache { z, a, layer_input: None, branch_ios: Vec::new() });
                }
                NodeKind::DepthConcat { activation } => {
                    let total_c: usize = parent_activations.iter().map(|t| t.shape().c).sum();
                    let s = parent_activations[0].shape();
                    let mut z = Tensor::new_zeroed(s.n, total_c, s.h, s.w);
                    let refs: Vec<&Tensor> = parent_activations.iter().collect();
                    merge::depth_concat_forward(&refs, &mut z)?;
                    let mut a = Tensor::like(&z);
                    activation::forward(*activation, &z, &mut a)?;
                    self.cache[i] = Some(NodeCache { z, a, layer_input: None, branch_ios: Vec::new() });
                }
                NodeKind::TrainingBranch { layers, .. } => {
                    if !training {
                        continue;
                    }
                    let mut current = parent_activations[0].clone();
                    let mut ios = Vec::with_capacity(layers.len());
                    for layer in layers.iter_mut() {
                        let out = layer.forward(&current, true)?;
                        ios.push((current, out.z));
                        current = out.a;
                    }
                    self.cache[i] = Some(NodeCache {
                        z: current.clone(),
                        a: current,
                        layer_input: None,
                        branch_ios: ios,
                    });
                }
            }
        }
        Ok(())
    }

    fn add_grad(grads: &mut [Option<Tensor>], idx: usize, g: Tensor) {
        if let Some(existing) = &mut grads[idx] {
            let mut arr = existing.as_array4_mut();
            *arr += g.as_array4();
        } else {
            grads[idx] = Some(g);
        }
    }
}

impl Default for Dag {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainableNetwork for Dag {
    fn forward(&mut self, x: &Tensor, training: bool) -> CnnResult<Tensor> {
        self.run_forward(x, training)?;
        let out = self.output.expect("dag output node not set");
        Ok(self.cache[out.0].as_ref().unwrap().a.clone())
    }

    fn train_step(
        &mut self,
        x: &Tensor,
        y: &Tensor,
        cost: CostKind,
        update_fn: &mut dyn FnMut(usize, &mut Layer, &Tensor, &Tensor, usize),
    ) -> CnnResult<f32> {
        let batch_size = x.shape().n;
        self.run_forward(x, true)?;
        let output = self.output.expect("dag output node not set");

        let output_activation = match &self.nodes[output.0].kind {
            NodeKind::Layer(l) => l.activation(),
            NodeKind::Sum { activation } | NodeKind::DepthConcat { activation } => *activation,
            _ => ActivationKind::Identity,
        };
        cost.validate_output_activation(output_activation)?;

        let y_hat = self.cache[output.0].as_ref().unwrap().a.clone();
        let z_out = self.cache[output.0].as_ref().unwrap().z.clone();
        let mut cost_value = cost.cost(&y_hat, y)?;

        let mut grads: Vec<Option<Tensor>> = (0..self.nodes.len()).map(|_| None).collect();
        let mut main_dy = Tensor::like(&y_hat);
        cost.cost_prime(&y_hat, y, &z_out, output_activation, &mut main_dy)?;
        Self::add_grad(&mut grads, output.0, main_dy);

        // Auxiliary training branches inject their gradient straight into
        // their parent's accumulator; they have no children to wait on.
        for i in 0..self.nodes.len() {
            let parent = self.nodes[i].parents.first().copied();
            let (branch_cost, aux_weight, has_cache) = match &self.nodes[i].kind {
                NodeKind::TrainingBranch { cost, aux_weight, .. } => {
                    (*cost, *aux_weight, self.cache[i].is_some())
                }
                _ => continue,
            };
            if !has_cache {
                continue;
            }
            let branch_y_hat = self.cache[i].as_ref().unwrap().a.clone();
            let branch_z = self.cache[i].as_ref().unwrap().z.clone();
            let last_activation = if let NodeKind::TrainingBranch { layers, .. } = &self.nodes[i].kind {
                layers.last().map(|l| l.activation()).unwrap_or(ActivationKind::Identity)
            } else {
                ActivationKind::Identity
            };
            branch_cost.validate_output_activation(last_activation)?;
            cost_value += aux_weight * branch_cost.cost(&branch_y_hat, y)?;

            let mut dy = Tensor::like(&branch_y_hat);
            branch_cost.cost_prime(&branch_y_hat, y, &branch_z, last_activation, &mut dy)?;

            let branch_ios = self.cache[i].as_ref().unwrap().branch_ios.clone();
            if let NodeKind::TrainingBranch { layers, .. } = &mut self.nodes[i].kind {
                for (layer, (layer_x, layer_z)) in layers.iter_mut().zip(branch_ios.into_iter()).rev() {
                    if layer.is_weighted() {
                        let g = layer.backward_weighted(&layer_x, &layer_z, &dy, true)?;
                        update_fn(i, layer, &g.d_weights, &g.d_biases, batch_size);
                        dy = g.dx.expect("need_dx requested");
                    } else {
                        dy = layer.backward_constant(&layer_x, &layer_z, &dy)?;
                    }
                }
            }
            // Scale by the auxiliary weight only on the way into the shared
            // parent; the branch's own internal weights already absorbed
            // the unscaled gradient above.
            let mut scaled = Tensor::like(&dy);
            {
                let mut s = scaled.as_array4_mut();
                s.assign(dy.as_array4());
                s.mapv_inplace(|v| v * aux_weight);
            }
            if let Some(parent) = parent {
                Self::add_grad(&mut grads, parent.0, scaled);
            }
        }

        for i in (0..self.nodes.len()).rev() {
            if matches!(self.nodes[i].kind, NodeKind::TrainingBranch { .. }) {
                continue;
            }
            let dy = match grads[i].take() {
                Some(dy) => dy,
                None => continue,
            };
            let parents = self.nodes[i].parents.clone();
            match &mut self.nodes[i].kind {
                NodeKind::Input => {}
                NodeKind::Layer(layer) => {
                    let cache = self.cache[i].as_ref().unwrap();
                    let layer_x = cache.layer_input.clone().unwrap();
                    let layer_z = cache.z.clone();
                    if layer.is_weighted() {
                        let g = layer.backward_weighted(&layer_x, &layer_z, &dy, true)?;
                        update_fn(i, layer, &g.d_weights, &g.d_biases, batch_size);
                        Self::add_grad(&mut grads, parents[0].0, g.dx.expect("need_dx requested"));
                    } else {
                        let dx = layer.backward_constant(&layer_x, &layer_z, &dy)?;
                        Self::add_grad(&mut grads, parents[0].0, dx);
                    }
                }
                NodeKind::Sum { activation } => {
                    let z = self.cache[i].as_ref().unwrap().z.clone();
                    let mut dz = Tensor::like(&z);
                    activation::backward(*activation, &z, &dy, &mut dz)?;
                    for (p, g) in parents.iter().zip(merge::sum_backward(parents.len(), &dz)) {
                        Self::add_grad(&mut grads, p.0, g);
                    }
                }
                NodeKind::DepthConcat { activation } => {
                    let z = self.cache[i].as_ref().unwrap().z.clone();
                    let mut dz = Tensor::like(&z);
                    activation::backward(*activation, &z, &dy, &mut dz)?;
                    let parent_shapes: Vec<Shape> = parents
                        .iter()
                        .map(|p| self.cache[p.0].as_ref().unwrap().a.shape())
                        .collect();
                    let split = merge::depth_concat_backward(&parent_shapes, &dz)?;
                    for (p, g) in parents.iter().zip(split) {
                        Self::add_grad(&mut grads, p.0, g);
                    }
                }
                NodeKind::TrainingBranch { .. } => unreachable!(),
            }
        }

        Ok(cost_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{FullyConnectedLayer, OutputLayer};
    use crate::tensor::Shape;

    #[test]
    fn sum_merge_combines_two_branches() {
        let mut dag = Dag::new();
        let input = dag.add_input();
        let branch_a = dag
            .add_layer(
                Layer::FullyConnected(FullyConnectedLayer::new(2, 2, 2, ActivationKind::Relu)),
                input,
            )
            .unwrap();
        let branch_b = dag
            .add_layer(
                Layer::FullyConnected(FullyConnectedLayer::new(2, 2, 2, ActivationKind::Relu)),
                input,
            )
            .unwrap();
        let merged = dag.add_sum(ActivationKind::Identity, vec![branch_a, branch_b]).unwrap();
        let output = dag
            .add_layer(Layer::Output(OutputLayer::new(Shape::flat(2, 2), ActivationKind::Sigmoid)), merged)
            .unwrap();
        dag.set_output(output);

        let x = Tensor::from_slice(&[1.0, 0.5, 0.2, 0.8], 2, 2, 1, 1).unwrap();
        let y = dag.forward(&x, false).unwrap();
        assert_eq!(y.shape(), Shape::flat(2, 2));
    }

    #[test]
    fn train_step_runs_end_to_end_on_a_dag() {
        let mut dag = Dag::new();
        let input = dag.add_input();
        let hidden = dag
            .add_layer(
                Layer::FullyConnected(FullyConnectedLayer::new(2, 2, 3, ActivationKind::Relu)),
                input,
            )
            .unwrap();
        let output = dag
            .add_layer(Layer::Output(OutputLayer::new(Shape::flat(2, 3), ActivationKind::Sigmoid)), hidden)
            .unwrap();
        dag.set_output(output);

        let x = Tensor::from_slice(&[1.0, 0.5, 0.2, 0.8], 2, 2, 1, 1).unwrap();
        let y = Tensor::from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 2, 3, 1, 1).unwrap();
        let cost = dag
            .train_step(&x, &y, CostKind::Quadratic, &mut |_, layer, dw, db, _batch_size| {
                if let Some((w, b)) = layer.weights_mut() {
                    let mut wv = w.as_array4_mut();
                    wv.scaled_add(-0.1, dw.as_array4());
                    let mut bv = b.as_array4_mut();
                    bv.scaled_add(-0.1, db.as_array4());
                }
            })
            .unwrap();
        assert!(cost.is_finite());
    }
}
