//! Batch collection and the cross-shuffle algorithm: after splitting
//! a dataset into fixed-size mini-batches, rows are swapped pairwise across
//! every pair of batches so that no batch keeps its original row
//! composition, then each batch's own row order is shuffled, then the
//! batch array itself is shuffled, all without ever materializing the full
//! dataset in one place again. Each `(x, y)` row pair is swapped together
//! so sample/label correspondence survives.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{CnnError, CnnResult};
use crate::tensor::Tensor;

pub struct Batch {
    pub x: Tensor,
    pub y: Tensor,
}

impl Batch {
    fn row_count(&self) -> usize {
        self.x.shape().n
    }
}

pub struct BatchCollection {
    pub batches: Vec<Batch>,
}

impl BatchCollection {
    /// Splits `(x, y)` into consecutive chunks of `batch_size` rows; the
    /// final chunk may be smaller.
    pub fn from_dataset(x: &Tensor, y: &Tensor, batch_size: usize) -> CnnResult<Self> {
        if batch_size == 0 {
            return Err(CnnError::InvalidArgument("batch_size must be nonzero".into()));
        }
        let n = x.shape().n;
        if y.shape().n != n {
            return Err(CnnError::ShapeMismatch {
                expected: vec![n],
                found: vec![y.shape().n],
            });
        }
        let x_arr = x.as_array4();
        let y_arr = y.as_array4();
        let mut batches = Vec::with_capacity((n + batch_size - 1) / batch_size);
        let mut start = 0;
        while start < n {
            let end = (start + batch_size).min(n);
            let x_chunk = x_arr.slice(ndarray::s![start..end, .., .., ..]).to_owned();
            let y_chunk = y_arr.slice(ndarray::s![start..end, .., .., ..]).to_owned();
            batches.push(Batch {
                x: Tensor::from_array4(x_chunk),
                y: Tensor::from_array4(y_chunk),
            });
            start = end;
        }
        Ok(Self { batches })
    }

    /// Swaps a bounded number of rows between every pair of batches, then
    /// shuffles row order within each batch, then shuffles the order of the
    /// batches themselves. Each step uses its own deterministic RNG derived
    /// from `seed`, rather than one RNG shared (and mutex-guarded) across
    /// the whole collection.
    pub fn cross_shuffle(&mut self, seed: u64) {
        let num_batches = self.batches.len();
        for i in 0..num_batches {
            for j in (i + 1)..num_batches {
                let pair_seed = seed ^ ((i as u64) << 32) ^ (j as u64).wrapping_mul(0x9E3779B97F4A7C15);
                let mut rng = StdRng::seed_from_u64(pair_seed);
                let rows_i = self.batches[i].row_count();
                let rows_j = self.batches[j].row_count();
                let swap_count = rows_i.min(rows_j);
                for _ in 0..swap_count {
                    let ri = rng.gen_range(0..rows_i);
                    let rj = rng.gen_range(0..rows_j);
                    let (left, right) = self.batches.split_at_mut(j);
                    let batch_i = &mut left[i];
                    let batch_j = &mut right[0];
                    swap_row(&mut batch_i.x, ri, &mut batch_j.x, rj);
                    swap_row(&mut batch_i.y, ri, &mut batch_j.y, rj);
                }
            }
        }

        for (idx, batch) in self.batches.iter_mut().enumerate() {
            let mut rng = StdRng::seed_from_u64(seed ^ (idx as u64).wrapping_mul(0xD6E8_FEB8_6659_FD93));
            let n = batch.row_count();
            for a in (1..n).rev() {
                let b = rng.gen_range(0..=a);
                swap_row_within(&mut batch.x, a, b);
                swap_row_within(&mut batch.y, a, b);
            }
        }

        let mut rng = StdRng::seed_from_u64(seed ^ 0xBF58_476D_1CE4_E5B9);
        for a in (1..num_batches).rev() {
            let b = rng.gen_range(0..=a);
            self.batches.swap(a, b);
        }
    }
}

fn swap_row(a: &mut Tensor, ai: usize, b: &mut Tensor, bi: usize) {
    let len = a.shape().entity_len();
    let a_row: Vec<f32> = a.as_slice()[ai * len..(ai + 1) * len].to_vec();
    let b_row: Vec<f32> = b.as_slice()[bi * len..(bi + 1) * len].to_vec();
    a.as_slice_mut()[ai * len..(ai + 1) * len].copy_from_slice(&b_row);
    b.as_slice_mut()[bi * len..(bi + 1) * len].copy_from_slice(&a_row);
}

fn swap_row_within(t: &mut Tensor, i: usize, j: usize) {
    if i == j {
        return;
    }
    let len = t.shape().entity_len();
    let slice = t.as_slice_mut();
    let (lo, hi) = if i < j { (i, j) } else { (j, i) };
    let (left, right) = slice.split_at_mut(hi * len);
    left[lo * len..(lo + 1) * len].swap_with_slice(&mut right[0..len]);
}
