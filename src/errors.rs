use thiserror::Error;

/// Error type for the core engine.
///
/// Kernel-level variants (`ShapeMismatch`, `InvalidArgument`) are
/// precondition violations: the core never attempts to recover from them,
/// it only propagates them to the caller via `?`. Trainer-level conditions
/// (`NumericOverflow`, `CrossEntropyOverflow`) are likewise surfaced as
/// explicit values rather than panics, but the training loop treats them as
/// `StopReason`s, not as something to retry.
#[derive(Error, Debug)]
pub enum CnnError {
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid layer configuration: {0}")]
    InvalidLayerConfig(String),

    #[error("cross-entropy cost produced +inf contribution")]
    CrossEntropyOverflow,

    #[error("serialization failure: {0}")]
    SerializationFailure(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CnnResult<T> = Result<T, CnnError>;
