pub mod ops;
pub mod storage;

use ndarray::{Array2, Array4, ArrayView2, ArrayViewMut2};
use serde::{Deserialize, Serialize};

pub use storage::Storage;

use crate::errors::{CnnError, CnnResult};

/// A 4D (N, C, H, W) shape descriptor. Memory for the tensor it describes is
/// always contiguous and row-major: the element at (n, c, h, w) sits at
/// offset `n*C*H*W + c*H*W + h*W + w`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl Shape {
    pub fn new(n: usize, c: usize, h: usize, w: usize) -> Self {
        Self { n, c, h, w }
    }

    /// Shape for a "flat" (N, size) value, used by fully-connected layers
    /// and the cost functions: modeled as (N, size, 1, 1).
    pub fn flat(n: usize, size: usize) -> Self {
        Self::new(n, size, 1, 1)
    }

    pub fn size(&self) -> usize {
        self.n * self.c * self.h * self.w
    }

    pub fn as_tuple(&self) -> (usize, usize, usize, usize) {
        (self.n, self.c, self.h, self.w)
    }

    pub fn as_vec(&self) -> Vec<usize> {
        vec![self.n, self.c, self.h, self.w]
    }

    /// The "entities x length" view used by FC and cost kernels: entities =
    /// N, length = C*H*W.
    pub fn entity_len(&self) -> usize {
        self.c * self.h * self.w
    }

    fn check_eq(&self, other: &Shape) -> CnnResult<()> {
        if self != other {
            return Err(CnnError::ShapeMismatch {
                expected: self.as_vec(),
                found: other.as_vec(),
            });
        }
        Ok(())
    }
}

/// The universal value type passed between kernels: a contiguous owned
/// buffer of `f32` with a 4D NCHW shape.
///
/// Rust's ownership model gives us the lifecycle the original design
/// demanded explicitly (every tensor owned by exactly one holder, freed
/// exactly once, double-free a fatal error): a `Tensor` is dropped exactly
/// once by the compiler and cannot be freed twice, so there is no `free`
/// method here — the holder simply lets the value go out of scope, or
/// `std::mem::drop`s it early if it wants to reclaim memory sooner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
}

impl Tensor {
    /// Allocates a zero-filled buffer of the given shape. An "uninitialized"
    /// allocation and a zeroed one collapse to the same operation in safe
    /// Rust; callers that want "uninitialized" semantics for performance
    /// should overwrite the buffer immediately after.
    pub fn new(n: usize, c: usize, h: usize, w: usize) -> Self {
        Self::new_zeroed(n, c, h, w)
    }

    pub fn new_zeroed(n: usize, c: usize, h: usize, w: usize) -> Self {
        let shape = Shape::new(n, c, h, w);
        Self {
            storage: Storage::Cpu(Array4::zeros((n, c, h, w))),
            shape,
        }
    }

    pub fn like(other: &Tensor) -> Self {
        let (n, c, h, w) = other.shape.as_tuple();
        Self::new_zeroed(n, c, h, w)
    }

    pub fn from_slice(source: &[f32], n: usize, c: usize, h: usize, w: usize) -> CnnResult<Self> {
        let shape = Shape::new(n, c, h, w);
        if source.len() != shape.size() {
            return Err(CnnError::ShapeMismatch {
                expected: shape.as_vec(),
                found: vec![source.len()],
            });
        }
        let array = Array4::from_shape_vec((n, c, h, w), source.to_vec())
            .map_err(|e| CnnError::InvalidArgument(e.to_string()))?;
        Ok(Self {
            storage: Storage::Cpu(array),
            shape,
        })
    }

    pub fn from_array4(array: Array4<f32>) -> Self {
        let dim = array.dim();
        let shape = Shape::new(dim.0, dim.1, dim.2, dim.3);
        Self {
            storage: Storage::Cpu(array),
            shape,
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// In-place view change: requires the new shape to have the same total
    /// size as the old one.
    pub fn reshape(&mut self, n: usize, c: usize, h: usize, w: usize) -> CnnResult<()> {
        let new_shape = Shape::new(n, c, h, w);
        if new_shape.size() != self.shape.size() {
            return Err(CnnError::ShapeMismatch {
                expected: self.shape.as_vec(),
                found: new_shape.as_vec(),
            });
        }
        let data = self.as_array4().clone().into_raw_vec();
        let array = Array4::from_shape_vec((n, c, h, w), data)
            .map_err(|e| CnnError::InvalidArgument(e.to_string()))?;
        self.storage = Storage::Cpu(array);
        self.shape = new_shape;
        Ok(())
    }

    /// Copies `src`'s data into `self`. Fails with `ShapeMismatch` if the
    /// shapes differ; never partially overwrites.
    pub fn overwrite(&mut self, src: &Tensor) -> CnnResult<()> {
        self.shape.check_eq(&src.shape)?;
        self.as_slice_mut().copy_from_slice(src.as_slice());
        Ok(())
    }

    pub fn as_array4(&self) -> &Array4<f32> {
        match &self.storage {
            Storage::Cpu(a) => a,
            #[cfg(feature = "cuda")]
            _ => panic!("kernel dispatch on a non-CPU tensor is not supported"),
        }
    }

    pub fn as_array4_mut(&mut self) -> &mut Array4<f32> {
        match &mut self.storage {
            Storage::Cpu(a) => a,
            #[cfg(feature = "cuda")]
            _ => panic!("kernel dispatch on a non-CPU tensor is not supported"),
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        self.as_array4()
            .as_slice()
            .expect("Tensor storage is always contiguous standard layout")
    }

    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        self.as_array4_mut()
            .as_slice_mut()
            .expect("Tensor storage is always contiguous standard layout")
    }

    /// "Entities x length" view: (N, C*H*W). Used by fully-connected and
    /// cost kernels.
    pub fn as_entities(&self) -> ArrayView2<'_, f32> {
        let (n, len) = (self.shape.n, self.shape.entity_len());
        self.as_array4()
            .view()
            .into_shape((n, len))
            .expect("contiguous NCHW reshapes to (N, C*H*W)")
    }

    pub fn as_entities_mut(&mut self) -> ArrayViewMut2<'_, f32> {
        let (n, len) = (self.shape.n, self.shape.entity_len());
        self.as_array4_mut()
            .view_mut()
            .into_shape((n, len))
            .expect("contiguous NCHW reshapes to (N, C*H*W)")
    }

    /// A single sample's single channel as an (H, W) slice, used by
    /// convolution and pooling kernels.
    pub fn channel_slice(&self, n: usize, c: usize) -> ArrayView2<'_, f32> {
        self.as_array4().slice(ndarray::s![n, c, .., ..])
    }

    pub fn mean(&self) -> f32 {
        self.as_array4().mean().unwrap_or(0.0)
    }

    pub fn has_nan_or_inf(&self) -> bool {
        self.as_slice().iter().any(|v| !v.is_finite())
    }
}

impl From<Array4<f32>> for Tensor {
    fn from(array: Array4<f32>) -> Self {
        Self::from_array4(array)
    }
}

impl From<Array2<f32>> for Tensor {
    fn from(array: Array2<f32>) -> Self {
        let (n, len) = array.dim();
        Self::from_array4(array.into_shape((n, len, 1, 1)).unwrap())
    }
}
