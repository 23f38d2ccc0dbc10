//! The training loop: epoch/batch iteration over a `BatchCollection`,
//! cancellation polling, numeric-overflow detection, the convergence
//! monitor's early-stopping decision, and the progress-callback contract.

pub mod convergence;

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::batch::BatchCollection;
use crate::cost::CostKind;
use crate::errors::CnnResult;
use crate::network::TrainableNetwork;
use crate::optim::Optimizer;
use crate::trainer::convergence::ConvergenceMonitor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EpochsCompleted,
    EarlyStopping,
    TrainingCanceled,
    NumericOverflow,
}

pub struct TrainerConfig {
    pub epochs: usize,
    pub convergence_tolerance: f32,
    pub convergence_patience: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            convergence_tolerance: 1e-4,
            convergence_patience: 5,
        }
    }
}

/// Progress callbacks, each optional. `batch_progress` fires after every
/// mini-batch, `training_progress` after every epoch's average cost is
/// known, `test_progress` once after a held-out evaluation pass.
#[derive(Default)]
pub struct TrainerCallbacks<'a> {
    pub batch_progress: Option<&'a mut dyn FnMut(usize, usize, f32)>,
    pub training_progress: Option<&'a mut dyn FnMut(usize, f32)>,
    pub test_progress: Option<&'a mut dyn FnMut(f32)>,
}

pub struct Trainer {
    pub config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Runs the training loop over `train_data`, applying `optimizer` to
    /// every weighted layer's gradients as they're produced. Polls `cancel`
    /// before every epoch and every batch.
    pub fn train(
        &self,
        network: &mut dyn TrainableNetwork,
        optimizer: &mut dyn Optimizer,
        cost: CostKind,
        train_data: &BatchCollection,
        cancel: &AtomicBool,
        mut callbacks: TrainerCallbacks,
    ) -> CnnResult<StopReason> {
        let mut monitor = ConvergenceMonitor::new(self.config.convergence_tolerance, self.config.convergence_patience);

        for epoch in 0..self.config.epochs {
            if cancel.load(Ordering::Relaxed) {
                info!(epoch, "training canceled");
                return Ok(StopReason::TrainingCanceled);
            }

            let mut epoch_cost_sum = 0.0f32;
            let mut batch_count = 0usize;

            for (batch_idx, batch) in train_data.batches.iter().enumerate() {
                if cancel.load(Ordering::Relaxed) {
                    info!(epoch, batch_idx, "training canceled mid-epoch");
                    return Ok(StopReason::TrainingCanceled);
                }

                let cost_value = network.train_step(&batch.x, &batch.y, cost, &mut |idx, layer, dw, db, batch_size| {
                    if let Some((w, b)) = layer.weights_mut() {
                        optimizer.step(idx, w, b, dw, db, batch_size);
                    }
                })?;

                if !cost_value.is_finite() {
                    warn!(epoch, batch_idx, cost_value, "numeric overflow detected");
                    return Ok(StopReason::NumericOverflow);
                }

                if let Some(cb) = callbacks.batch_progress.as_mut() {
                    cb(epoch, batch_idx, cost_value);
                }
                epoch_cost_sum += cost_value;
                batch_count += 1;
            }

            let avg_cost = epoch_cost_sum / batch_count.max(1) as f32;
            info!(epoch, avg_cost, "epoch complete");
            if let Some(cb) = callbacks.training_progress.as_mut() {
                cb(epoch, avg_cost);
            }

            if monitor.observe(avg_cost) {
                return Ok(StopReason::EarlyStopping);
            }
        }

        Ok(StopReason::EpochsCompleted)
    }

    /// Forward-only evaluation over `data`, returning the average cost.
    /// Used for both validation-during-training and a final test pass; the
    /// caller decides which `data` and whether to wire `test_progress`.
    pub fn evaluate(
        &self,
        network: &mut dyn TrainableNetwork,
        cost: CostKind,
        data: &BatchCollection,
        test_progress: Option<&mut dyn FnMut(f32)>,
    ) -> CnnResult<f32> {
        let mut total = 0.0f32;
        let mut count = 0usize;
        for batch in &data.batches {
            let y_hat = network.forward(&batch.x, false)?;
            total += cost.cost(&y_hat, &batch.y)?;
            count += 1;
        }
        let avg = total / count.max(1) as f32;
        if let Some(cb) = test_progress {
            cb(avg);
        }
        Ok(avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{FullyConnectedLayer, Layer, OutputLayer};
    use crate::network::Sequential;
    use crate::optim::Sgd;
    use crate::tensor::{Shape, Tensor};
    use crate::types::ActivationKind;

    fn xor_dataset() -> (Tensor, Tensor) {
        let x = Tensor::from_slice(&[0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0], 4, 2, 1, 1).unwrap();
        let y = Tensor::from_slice(&[0.0, 1.0, 1.0, 0.0], 4, 1, 1, 1).unwrap();
        (x, y)
    }

    #[test]
    fn training_runs_to_epoch_completion_without_error() {
        let (x, y) = xor_dataset();
        let data = BatchCollection::from_dataset(&x, &y, 4).unwrap();
        let mut net = Sequential::new(vec![
            Layer::FullyConnected(FullyConnectedLayer::new(4, 2, 4, ActivationKind::Relu)),
            Layer::FullyConnected(FullyConnectedLayer::new(4, 4, 1, ActivationKind::Identity)),
            Layer::Output(OutputLayer::new(Shape::flat(4, 1), ActivationKind::Sigmoid)),
        ]);
        let mut optimizer = Sgd::new(0.5);
        let trainer = Trainer::new(TrainerConfig {
            epochs: 5,
            convergence_tolerance: 1e-9,
            convergence_patience: 1000,
        });
        let cancel = AtomicBool::new(false);
        let reason = trainer
            .train(&mut net, &mut optimizer, CostKind::Quadratic, &data, &cancel, TrainerCallbacks::default())
            .unwrap();
        assert_eq!(reason, StopReason::EpochsCompleted);
    }

    #[test]
    fn canceled_flag_stops_training_immediately() {
        let (x, y) = xor_dataset();
        let data = BatchCollection::from_dataset(&x, &y, 4).unwrap();
        let mut net = Sequential::new(vec![
            Layer::FullyConnected(FullyConnectedLayer::new(4, 2, 1, ActivationKind::Identity)),
            Layer::Output(OutputLayer::new(Shape::flat(4, 1), ActivationKind::Sigmoid)),
        ]);
        let mut optimizer = Sgd::new(0.1);
        let trainer = Trainer::new(TrainerConfig::default());
        let cancel = AtomicBool::new(true);
        let reason = trainer
            .train(&mut net, &mut optimizer, CostKind::Quadratic, &data, &cancel, TrainerCallbacks::default())
            .unwrap();
        assert_eq!(reason, StopReason::TrainingCanceled);
    }
}
