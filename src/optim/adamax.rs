use std::collections::HashMap;

use crate::optim::{batch_average, Optimizer};
use crate::tensor::Tensor;

const EPS: f32 = 1e-8;

struct State {
    m_w: Tensor,
    u_w: Tensor,
    m_b: Tensor,
    u_b: Tensor,
    t: u64,
}

pub struct AdaMax {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    state: HashMap<usize, State>,
}

impl AdaMax {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            state: HashMap::new(),
        }
    }
}

fn update_one(lr: f32, beta1: f32, beta2: f32, t: u64, m: &mut Tensor, u: &mut Tensor, param: &mut Tensor, grad: &Tensor) {
    ndarray::Zip::from(m.as_array4_mut())
        .and(grad.as_array4())
        .for_each(|m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
    ndarray::Zip::from(u.as_array4_mut())
        .and(grad.as_array4())
        .for_each(|u, &g| *u = (beta2 * *u).max(g.abs()));

    let bias_correction1 = 1.0 - beta1.powi(t as i32);
    ndarray::Zip::from(param.as_array4_mut())
        .and(m.as_array4())
        .and(u.as_array4())
        .for_each(|p, &m_raw, &u| {
            let m_hat = m_raw / bias_correction1;
            *p -= lr * m_hat / (u + EPS);
        });
}

impl Optimizer for AdaMax {
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
            u_w: Tensor::like(&d_weights),
            m_b: Tensor::like(&d_biases),
            u_b: Tensor::like(&d_biases),
            t: 0,
        });
        state.t += 1;
        update_one(self.learning_rate, self.beta1, self.beta2, state.t, &mut state.m_w, &mut state.u_w, weights, &d_weights);
        update_one(self.learning_rate, self.beta1, self.beta2, state.t, &mut state.m_b, &mut state.u_b, biases, &d_biases);
    }
}
