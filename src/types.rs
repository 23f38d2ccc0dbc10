use serde::{Deserialize, Serialize};

/// Activation function identifier shared by every layer kind, and by the
/// cost-function contract (cross-entropy requires `Sigmoid`, log-likelihood
/// requires `Softmax`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationKind {
    Identity,
    Sigmoid,
    Tanh,
    Relu,
    LeakyRelu,
    Elu,
    Softmax,
}

/// Unique identifier for a node in a DAG network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Compute device a tensor's storage lives on. Only `Cpu` is ever
/// constructed by this crate; `Cuda` exists so an alternate Implementation
/// Provider can be plugged in behind the `cuda` feature without changing
/// any call site that matches on `Device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    #[cfg(feature = "cuda")]
    Cuda(usize),
}
