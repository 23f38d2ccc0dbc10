//! A linear chain of layers: each layer's output feeds the next layer's
//! input, with no branching or merging.

use crate::cost::CostKind;
use crate::errors::CnnResult;
use crate::layers::Layer;
use crate::network::TrainableNetwork;
use crate::tensor::Tensor;

pub struct Sequential {
    pub layers: Vec<Layer>,
}

impl Sequential {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    fn forward_with_cache(&mut self, x: &Tensor, training: bool) -> CnnResult<(Vec<(Tensor, Tensor)>, Tensor)> {
        let mut cache = Vec::with_capacity(self.layers.len());
        let mut current = x.clone();
        for layer in self.layers.iter_mut() {
            let out = layer.forward(&current, training)?;
            cache.push((current, out.z));
            current = out.a;
        }
        Ok((cache, current))
    }
}

impl TrainableNetwork for Sequential {
    fn forward(&mut self, x: &Tensor, training: bool) -> CnnResult<Tensor> {
        let (_, a) = self.forward_with_cache(x, training)?;
        Ok(a)
    }

    fn train_step(
        &mut self,
        x: &Tensor,
        y: &Tensor,
        cost: CostKind,
        update_fn: &mut dyn FnMut(usize, &mut Layer, &Tensor, &Tensor, usize),
    ) -> CnnResult<f32> {
        let batch_size = x.shape().n;
        let (cache, y_hat) = self.forward_with_cache(x, true)?;
        let last_activation = self.layers.last().expect("network has at least one layer").activation();
        cost.validate_output_activation(last_activation)?;
        let cost_value = cost.cost(&y_hat, y)?;

        let (_, last_z) = cache.last().unwrap();
        let mut dy = Tensor::like(&y_hat);
        cost.cost_prime(&y_hat, y, last_z, last_activation, &mut dy)?;

        for (idx, (layer, (layer_x, layer_z))) in self
            .layers
            .iter_mut()
            .zip(cache.into_iter())
            .enumerate()
            .rev()
        {
            let need_dx = idx > 0;
            if layer.is_weighted() {
                let grads = layer.backward_weighted(&layer_x, &layer_z, &dy, need_dx)?;
                update_fn(idx, layer, &grads.d_weights, &grads.d_biases, batch_size);
                if let Some(dx) = grads.dx {
                    dy = dx;
                }
            } else {
                dy = layer.backward_constant(&layer_x, &layer_z, &dy)?;
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
    use crate::types::ActivationKind;

    #[test]
    fn train_step_reduces_cost_after_several_updates() {
        let mut net = Sequential::new(vec![
            Layer::FullyConnected(FullyConnectedLayer::new(2, 2, 2, ActivationKind::Relu)),
            Layer::Output(OutputLayer::new(Shape::flat(2, 2), ActivationKind::Sigmoid)),
        ]);
        let x = Tensor::from_slice(&[1.0, 0.5, 0.2, 0.8], 2, 2, 1, 1).unwrap();
        let y = Tensor::from_slice(&[1.0, 0.0, 0.0, 1.0], 2, 2, 1, 1).unwrap();

        let mut first_cost = None;
        let mut last_cost = 0.0;
        for _ in 0..20 {
            last_cost = net
                .train_step(&x, &y, CostKind::Quadratic, &mut |_, layer, dw, db, _batch_size| {
                    if let Some((w, b)) = layer.weights_mut() {
                        let mut wv = w.as_array4_mut();
                        wv.scaled_add(-0.1, dw.as_array4());
                        let mut bv = b.as_array4_mut();
                        bv.scaled_add(-0.1, db.as_array4());
                    }
                })
                .unwrap();
            if first_cost.is_none() {
                first_cost = Some(last_cost);
            }
        }
        assert!(last_cost < first_cost.unwrap());
    }
}
