//! Core tensor/kernel/layer/network/trainer engine for convolutional
//! neural networks: a 4D NCHW tensor model, CPU reference kernels for the
//! usual building blocks (GEMM, convolution, pooling, batch norm,
//! activations, softmax, merges), a tagged-variant layer set, chain and
//! DAG network topologies, seven optimizers, and a trainer loop with
//! cancellation, numeric-overflow detection, and a convergence monitor.

pub mod batch;
pub mod cost;
pub mod errors;
pub mod io;
pub mod kernels;
pub mod layers;
pub mod network;
pub mod optim;
pub mod sample_provider;
pub mod tensor;
pub mod trainer;
pub mod types;

pub use cost::CostKind;
pub use errors::{CnnError, CnnResult};
pub use layers::Layer;
pub use network::{Dag, Sequential, TrainableNetwork};
pub use tensor::{Shape, Tensor};
pub use trainer::{StopReason, Trainer, TrainerCallbacks, TrainerConfig};
pub use types::{ActivationKind, Device, NodeId};
