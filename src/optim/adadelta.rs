use std::collections::HashMap;

use crate::optim::{batch_average, Optimizer};
use crate::tensor::Tensor;

const EPS: f32 = 1e-6;

/// Per-layer state: accumulated squared gradient and accumulated squared
/// update, for both weights and biases.
struct State {
    accum_grad_w: Tensor,
    accum_grad_b: Tensor,
    accum_update_w: Tensor,
    accum_update_b: Tensor,
}

pub struct AdaDelta {
    pub rho: f32,
    state: HashMap<usize, State>,
}

impl AdaDelta {
    pub fn new(rho: f32) -> Self {
        Self { rho, state: HashMap::new() }
    }
}

fn update_one(rho: f32, accum_grad: &mut Tensor, accum_update: &mut Tensor, param: &mut Tensor, grad: &Tensor) {
    ndarray::Zip::from(accum_grad.as_array4_mut())
        .and(grad.as_array4())
        .for_each(|ag, &g| *ag = rho * *ag + (1.0 - rho) * g * g);

    let rms_update = accum_update.as_array4().mapv(|v| (v + EPS).sqrt());
    let rms_grad = accum_grad.as_array4().mapv(|v| (v + EPS).sqrt());
    let delta = {
        let mut d = grad.as_array4().to_owned();
        d *= &rms_update;
        d /= &rms_grad;
        d
    };

    ndarray::Zip::from(accum_update.as_array4_mut())
        .and(&delta)
        .for_each(|au, &d| *au = rho * *au + (1.0 - rho) * d * d);

    *param.as_array4_mut() -= &delta;
}

impl Optimizer for AdaDelta {
    fn step(
        &mut self,
        layer_index: usize,
        weights: &mut Tensor,
        biases: &mut Tensor,
        d_weights: &Tensor,
        d_biases: &Tensor,
        batch_size: usize,
    ) {
        let d_weights = batch_average(d_weights, batch_size);
        let d_biases = batch_average(d_biases, batch_size);

        let state = self.state.entry(layer_index).or_insert_with(|| State {
            accum_grad_w: Tensor::like(&d_weights),
            accum_grad_b: Tensor::like(&d_biases),
            accum_update_w: Tensor::like(&d_weights),
            accum_update_b: Tensor::like(&d_biases),
        });
        update_one(self.rho, &mut state.accum_grad_w, &mut state.accum_update_w, weights, &d_weights);
        update_one(self.rho, &mut state.accum_grad_b, &mut state.accum_update_b, biases, &d_biases);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_moves_weights_without_an_explicit_learning_rate() {
        let mut opt = AdaDelta::new(0.95);
        let mut w = Tensor::from_slice(&[1.0], 1, 1, 1, 1).unwrap();
        let mut b = Tensor::new_zeroed(1, 1, 1, 1);
        let dw = Tensor::from_slice(&[1.0], 1, 1, 1, 1).unwrap();
        let db = Tensor::new_zeroed(1, 1, 1, 1);
        opt.step(0, &mut w, &mut b, &dw, &db, 1);
        assert!(w.as_slice()[0] < 1.0);
    }
}
