use crate::optim::{batch_average, Optimizer};
use crate::tensor::Tensor;

pub struct Sgd {
    pub learning_rate: f32,
    pub l2: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate, l2: 0.0 }
    }

    pub fn with_l2(learning_rate: f32, l2: f32) -> Self {
        Self { learning_rate, l2 }
    }
}

impl Optimizer for Sgd {
    fn step(
        &mut self,
        _layer_index: usize,
        weights: &mut Tensor,
        biases: &mut Tensor,
        d_weights: &Tensor,
        d_biases: &Tensor,
        batch_size: usize,
    ) {
        let n = batch_size.max(1) as f32;
        let dw = batch_average(d_weights, batch_size);
        let db = batch_average(d_biases, batch_size);

        // w <- w - (lr/N)*dW - (lr*l2/N)*w
        let decay = weights.as_array4().to_owned();
        weights.as_array4_mut().scaled_add(-self.learning_rate, dw.as_array4());
        if self.l2 != 0.0 {
            weights.as_array4_mut().scaled_add(-self.learning_rate * self.l2 / n, &decay);
        }
        biases.as_array4_mut().scaled_add(-self.learning_rate, db.as_array4());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_moves_weights_against_the_gradient() {
        let mut sgd = Sgd::new(0.1);
        let mut w = Tensor::from_slice(&[1.0, 1.0], 1, 2, 1, 1).unwrap();
        let mut b = Tensor::new_zeroed(1, 2, 1, 1);
        let dw = Tensor::from_slice(&[1.0, -1.0], 1, 2, 1, 1).unwrap();
        let db = Tensor::new_zeroed(1, 2, 1, 1);
        sgd.step(0, &mut w, &mut b, &dw, &db, 1);
        assert!((w.as_slice()[0] - 0.9).abs() < 1e-6);
        assert!((w.as_slice()[1] - 1.1).abs() < 1e-6);
    }

    #[test]
    fn batch_size_divides_the_summed_gradient() {
        let mut sgd = Sgd::new(0.1);
        let mut w = Tensor::from_slice(&[1.0], 1, 1, 1, 1).unwrap();
        let mut b = Tensor::new_zeroed(1, 1, 1, 1);
        let dw = Tensor::from_slice(&[4.0], 1, 1, 1, 1).unwrap();
        let db = Tensor::new_zeroed(1, 1, 1, 1);
        sgd.step(0, &mut w, &mut b, &dw, &db, 4);
        // effective gradient is 4.0/4 = 1.0, so the step is -0.1*1.0.
        assert!((w.as_slice()[0] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn zero_gradient_is_idempotent_modulo_l2_shrinkage() {
        let mut sgd = Sgd::with_l2(0.1, 0.5);
        let mut w = Tensor::from_slice(&[2.0], 1, 1, 1, 1).unwrap();
        let mut b = Tensor::new_zeroed(1, 1, 1, 1);
        let dw = Tensor::new_zeroed(1, 1, 1, 1);
        let db = Tensor::new_zeroed(1, 1, 1, 1);
        sgd.step(0, &mut w, &mut b, &dw, &db, 1);
        // w <- w - (lr*l2/N)*w = 2.0 - 0.1*0.5*2.0 = 1.9; no L2 means no change.
        assert!((w.as_slice()[0] - 1.9).abs() < 1e-6);

        let mut sgd_no_l2 = Sgd::new(0.1);
        let mut w2 = Tensor::from_slice(&[2.0], 1, 1, 1, 1).unwrap();
        sgd_no_l2.step(0, &mut w2, &mut b, &dw, &db, 1);
        assert!((w2.as_slice()[0] - 2.0).abs() < 1e-6);
    }
}
