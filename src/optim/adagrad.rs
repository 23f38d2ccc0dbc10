use std::collections::HashMap;

use crate::optim::{batch_average, Optimizer};
use crate::tensor::Tensor;

const EPS: f32 = 1e-8;

pub struct AdaGrad {
    pub learning_rate: f32,
    accum: HashMap<usize, (Tensor, Tensor)>,
}

impl AdaGrad {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            accum: HashMap::new(),
        }
    }
}

impl Optimizer for AdaGrad {
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

        let (gw, gb) = self
            .accum
            .entry(layer_index)
            .or_insert_with(|| (Tensor::like(&d_weights), Tensor::like(&d_biases)));

        ndarray::Zip::from(gw.as_array4_mut())
            .and(d_weights.as_array4())
            .for_each(|g, &d| *g += d * d);
        ndarray::Zip::from(gb.as_array4_mut())
            .and(d_biases.as_array4())
            .for_each(|g, &d| *g += d * d);

        let lr = self.learning_rate;
        ndarray::Zip::from(weights.as_array4_mut())
            .and(d_weights.as_array4())
            .and(gw.as_array4())
            .for_each(|w, &d, &g| *w -= lr * d / (g.sqrt() + EPS));
        ndarray::Zip::from(biases.as_array4_mut())
            .and(d_biases.as_array4())
            .and(gb.as_array4())
            .for_each(|b, &d, &g| *b -= lr * d / (g.sqrt() + EPS));
    }
}
