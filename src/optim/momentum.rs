use std::collections::HashMap;

use crate::optim::{batch_average, Optimizer};
use crate::tensor::Tensor;

pub struct Momentum {
    pub learning_rate: f32,
    pub momentum: f32,
    velocity: HashMap<usize, (Tensor, Tensor)>,
}

impl Momentum {
    pub fn new(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: HashMap::new(),
        }
    }
}

impl Optimizer for Momentum {
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

        let (vw, vb) = self
            .velocity
            .entry(layer_index)
            .or_insert_with(|| (Tensor::like(&d_weights), Tensor::like(&d_biases)));

        let mut vw_arr = vw.as_array4_mut();
        vw_arr.mapv_inplace(|v| v * self.momentum);
        vw_arr.scaled_add(self.learning_rate, d_weights.as_array4());
        drop(vw_arr);

        let mut vb_arr = vb.as_array4_mut();
        vb_arr.mapv_inplace(|v| v * self.momentum);
        vb_arr.scaled_add(self.learning_rate, d_biases.as_array4());
        drop(vb_arr);

        weights.as_array4_mut().scaled_add(-1.0, vw.as_array4());
        biases.as_array4_mut().scaled_add(-1.0, vb.as_array4());
    }
}
