//! Cost functions: each is a (cost, cost-prime) pair satisfying a fixed
//! contract. `cost` reduces a prediction/target pair to a scalar;
//! `cost_prime` writes the output layer's error delta into `dx`.

use crate::errors::{CnnError, CnnResult};
use crate::kernels;
use crate::tensor::Tensor;
use crate::types::ActivationKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CostKind {
    Quadratic,
    CrossEntropy,
    LogLikelihood,
}

impl CostKind {
    /// The output activation this cost must be paired with, if any.
    /// Softmax must be paired with log-likelihood; cross-entropy requires
    /// sigmoid output.
    pub fn required_output_activation(self) -> Option<ActivationKind> {
        match self {
            CostKind::Quadratic => None,
            CostKind::CrossEntropy => Some(ActivationKind::Sigmoid),
            CostKind::LogLikelihood => Some(ActivationKind::Softmax),
        }
    }

    pub fn validate_output_activation(self, activation: ActivationKind) -> CnnResult<()> {
        if let Some(required) = self.required_output_activation() {
            if activation != required {
                return Err(CnnError::InvalidLayerConfig(format!(
                    "{self:?} requires output activation {required:?}, found {activation:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn cost(self, y_hat: &Tensor, y: &Tensor) -> CnnResult<f32> {
        kernels::require_shape_eq(y_hat.shape(), y.shape())?;
        match self {
            CostKind::Quadratic => {
                let mut diff = Tensor::like(y_hat);
                kernels::elementwise::subtract(y_hat, y, &mut diff)?;
                let sum_sq: f32 = diff.as_slice().iter().map(|d| d * d).sum();
                Ok(0.5 * sum_sq)
            }
            CostKind::CrossEntropy => {
                let n = y_hat.shape().n as f32;
                let mut total = 0.0f64;
                for (&yh, &yv) in y_hat.as_slice().iter().zip(y.as_slice().iter()) {
                    let term = (yv as f64) * (yh as f64).ln() + (1.0 - yv as f64) * (1.0 - yh as f64).ln();
                    if term.is_nan() {
                        continue;
                    }
                    if term == f64::NEG_INFINITY {
                        total += -(f32::MAX as f64);
                        continue;
                    }
                    if term == f64::INFINITY {
                        return Err(CnnError::CrossEntropyOverflow);
                    }
                    total += term;
                }
                Ok((-total / n as f64) as f32)
            }
            CostKind::LogLikelihood => {
                // -ln(y_hat[argmax y]), averaged across the batch.
                let entities_hat = y_hat.as_entities();
                let entities_y = y.as_entities();
                let n = entities_hat.dim().0;
                let mut total = 0.0f32;
                for row in 0..n {
                    let target_row = entities_y.row(row);
                    let pred_row = entities_hat.row(row);
                    let argmax = target_row
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    total += -pred_row[argmax].ln();
                }
                Ok(total / n as f32)
            }
        }
    }

    pub fn cost_prime(
        self,
        y_hat: &Tensor,
        y: &Tensor,
        z: &Tensor,
        activation: ActivationKind,
        dx: &mut Tensor,
    ) -> CnnResult<()> {
        kernels::require_shape_eq(y_hat.shape(), y.shape())?;
        kernels::require_shape_eq(y_hat.shape(), dx.shape())?;
        match self {
            CostKind::Quadratic => {
                let mut diff = Tensor::like(y_hat);
                kernels::elementwise::subtract(y_hat, y, &mut diff)?;
                kernels::activation::backward(activation, z, &diff, dx)
            }
            // Cross-entropy/log-likelihood's prime is taken with respect
            // to the pre-activation logits directly: dX = y_hat - y. The
            // activation-prime factor is intentionally not applied; this
            // requires the matching output activation validated above.
            CostKind::CrossEntropy | CostKind::LogLikelihood => {
                kernels::elementwise::subtract(y_hat, y, dx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_cost_matches_scenario_5() {
        let y_hat = Tensor::from_slice(&[0.9, 0.1], 1, 2, 1, 1).unwrap();
        let y = Tensor::from_slice(&[1.0, 0.0], 1, 2, 1, 1).unwrap();
        let cost = CostKind::Quadratic.cost(&y_hat, &y).unwrap();
        assert!((cost - 0.01).abs() < 1e-6);
    }

    #[test]
    fn quadratic_prime_matches_scenario_5() {
        let y_hat = Tensor::from_slice(&[0.9, 0.1], 1, 2, 1, 1).unwrap();
        let y = Tensor::from_slice(&[1.0, 0.0], 1, 2, 1, 1).unwrap();
        let z = Tensor::from_slice(&[2.197, -2.197], 1, 2, 1, 1).unwrap();
        let mut dx = Tensor::new_zeroed(1, 2, 1, 1);
        CostKind::Quadratic
            .cost_prime(&y_hat, &y, &z, ActivationKind::Sigmoid, &mut dx)
            .unwrap();
        assert!((dx.as_slice()[0] - (-0.0082)).abs() < 2e-3);
        assert!((dx.as_slice()[1] - 0.0082).abs() < 2e-3);
    }

    #[test]
    fn cross_entropy_requires_sigmoid_output() {
        assert!(CostKind::CrossEntropy
            .validate_output_activation(ActivationKind::Sigmoid)
            .is_ok());
        assert!(CostKind::CrossEntropy
            .validate_output_activation(ActivationKind::Relu)
            .is_err());
    }

    #[test]
    fn log_likelihood_requires_softmax() {
        assert!(CostKind::LogLikelihood
            .validate_output_activation(ActivationKind::Softmax)
            .is_ok());
        assert!(CostKind::LogLikelihood
            .validate_output_activation(ActivationKind::Identity)
            .is_err());
    }
}
