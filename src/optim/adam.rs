use std::collections::HashMap;

use crate::optim::{batch_average, Optimizer};
use crate::tensor::Tensor;

const EPS: f32 = 1e-8;

struct State {
    m_w: Tensor,
    v_w: Tensor,
    m_b: Tensor,
    v_b: Tensor,
    t: u64,
}

pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    state: HashMap<usize, State>,
}

impl Adam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            state: HashMap::new(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn update_one(lr: f32, beta1: f32, beta2: f32, t: u64, m: &mut Tensor, v: &mut Tensor, param: &mut Tensor, grad: &Tensor) {
    ndarray::Zip::from(m.as_array4_mut())
        .and(grad.as_array4())
        .for_each(|m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
    ndarray::Zip::from(v.as_array4_mut())
        .and(grad.as_array4())
        .for_each(|v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

    let bias_correction1 = 1.0 - beta1.powi(t as i32);
    let bias_correction2 = 1.0 - beta2.powi(t as i32);

    ndarray::Zip::from(param.as_array4_mut())
        .and(m.as_array4())
        .and(v.as_array4())
        .for_each(|p, &m_hat_raw, &v_hat_raw| {
            let m_hat = m_hat_raw / bias_correction1;
            let v_hat = v_hat_raw / bias_correction2;
            *p -= lr * m_hat / (v_hat.sqrt() + EPS);
        });
}

impl Optimizer for Adam {
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
            m_w: Tensor::like(&d_weights),
            v_w: Tensor::like(&d_weights),
            m_b: Tensor::like(&d_biases),
            v_b: Tensor::like(&d_biases),
            t: 0,
        });
        state.t += 1;
        update_one(self.learning_rate, self.beta1, self.beta2, state.t, &mut state.m_w, &mut state.v_w, weights, &d_weights);
        update_one(self.learning_rate, self.beta1, self.beta2, state.t, &mut state.m_b, &mut state.v_b, biases, &d_biases);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_matches_unbiased_single_sample_update() {
        let mut opt = Adam::new(0.1, 0.9, 0.999);
        let mut w = Tensor::from_slice(&[0.0], 1, 1, 1, 1).unwrap();
        let mut b = Tensor::new_zeroed(1, 1, 1, 1);
        let dw = Tensor::from_slice(&[1.0], 1, 1, 1, 1).unwrap();
        let db = Tensor::new_zeroed(1, 1, 1, 1);
        opt.step(0, &mut w, &mut b, &dw, &db, 1);
        // m_hat = v_hat = 1.0 after bias correction on step 1, so the
        // update should be ~ -lr.
        assert!((w.as_slice()[0] - (-0.1)).abs() < 1e-3);
    }
}
