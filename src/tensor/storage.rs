#[cfg(feature = "cuda")]
use std::sync::Arc;

use ndarray::Array4;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Where a tensor's bytes live. Only the `Cpu` arm has kernels implemented
/// in this crate; `Cuda` is the seam a GPU Implementation Provider would
/// fill in (see `kernels`/`Device`), gated behind the `cuda` feature so a
/// default build never links `cudarc`.
#[derive(Clone, Debug)]
pub enum Storage {
    Cpu(Array4<f32>),
    #[cfg(feature = "cuda")]
    Cuda(Arc<cudarc::driver::CudaSlice<f32>>),
}

// Manual impl because `CudaSlice` doesn't implement `Serialize`/`Deserialize`.
// Persistence always round-trips through the CPU representation.
impl Serialize for Storage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Storage::Cpu(data) => data.serialize(serializer),
            #[cfg(feature = "cuda")]
            Storage::Cuda(slice) => {
                let data = slice
                    .device()
                    .dtoh_sync_copy(slice.as_ref())
                    .map_err(serde::ser::Error::custom)?;
                data.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Storage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data = Array4::<f32>::deserialize(deserializer)?;
        Ok(Storage::Cpu(data))
    }
}
