//! 2x2 stride-2 max-pooling forward/backward.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use ndarray::Array3;

use crate::errors::{CnnError, CnnResult};
use crate::tensor::Tensor;

fn ceil_div2(x: usize) -> usize {
    (x + 1) / 2
}

/// Max-pool forward. Window is 2x2 with stride 2; when `H_in`/`W_in` is
/// odd, the last row/column pools over a partial window (size 1 or 2).
/// Output shape is `(N, C, ceil(H_in/2), ceil(W_in/2))`.
pub fn pool_forward(x: &Tensor, out: &mut Tensor) -> CnnResult<()> {
    let (n, c, h_in, w_in) = x.shape().as_tuple();
    let (h_out, w_out) = (ceil_div2(h_in), ceil_div2(w_in));
    crate::kernels::require_shape_eq(crate::tensor::Shape::new(n, c, h_out, w_out), out.shape())?;

    let x_arr = x.as_array4();
    let compute_sample = |ni: usize| -> Array3<f32> {
        let mut y = Array3::<f32>::zeros((c, h_out, w_out));
        for ci in 0..c {
            for i in 0..h_out {
                let hi0 = i * 2;
                let hi1 = (hi0 + 1).min(h_in - 1);
                for j in 0..w_out {
                    let wj0 = j * 2;
                    let wj1 = (wj0 + 1).min(w_in - 1);
                    let mut max_val = f32::NEG_INFINITY;
                    for hh in [hi0, hi1] {
                        for ww in [wj0, wj1] {
                            let v = x_arr[[ni, ci, hh, ww]];
                            if v > max_val {
                                max_val = v;
                            }
                        }
                    }
                    y[[ci, i, j]] = max_val;
                }
            }
        }
        y
    };

    #[cfg(feature = "rayon")]
    let samples: Vec<Array3<f32>> = (0..n).into_par_iter().map(compute_sample).collect();
    #[cfg(not(feature = "rayon"))]
    let samples: Vec<Array3<f32>> = (0..n).map(compute_sample).collect();

    let out_arr = out.as_array4_mut();
    for (ni, sample) in samples.into_iter().enumerate() {
        out_arr.index_axis_mut(ndarray::Axis(0), ni).assign(&sample);
    }
    Ok(())
}

/// Max-pool backward. Writes `dY` into the position that attained the max
/// within each window of the cached `x`, and 0 elsewhere. This mutates `x`
/// in place to become `dX` as a deliberate memory-thrift aliasing: the
/// caller must not read `x` as the forward input after calling this.
pub fn pool_backward_in_place(x: &mut Tensor, dy: &Tensor) -> CnnResult<()> {
    let (n, c, h_in, w_in) = x.shape().as_tuple();
    let (h_out, w_out) = (ceil_div2(h_in), ceil_div2(w_in));
    let expected_dy = crate::tensor::Shape::new(n, c, h_out, w_out);
    if expected_dy != dy.shape() {
        return Err(CnnError::ShapeMismatch {
            expected: expected_dy.as_vec(),
            found: dy.shape().as_vec(),
        });
    }

    let dy_arr = dy.as_array4();
    let x_arr = x.as_array4_mut();
    for ni in 0..n {
        for ci in 0..c {
            for i in 0..h_out {
                let hi0 = i * 2;
                let hi1 = (hi0 + 1).min(h_in - 1);
                for j in 0..w_out {
                    let wj0 = j * 2;
                    let wj1 = (wj0 + 1).min(w_in - 1);

                    let mut best = (hi0, wj0);
                    let mut best_val = x_arr[[ni, ci, hi0, wj0]];
                    for hh in [hi0, hi1] {
                        for ww in [wj0, wj1] {
                            let v = x_arr[[ni, ci, hh, ww]];
                            if v > best_val {
                                best_val = v;
                                best = (hh, ww);
                            }
                        }
                    }

                    let grad = dy_arr[[ni, ci, i, j]];
                    for hh in [hi0, hi1] {
                        for ww in [wj0, wj1] {
                            x_arr[[ni, ci, hh, ww]] = if (hh, ww) == best { grad } else { 0.0 };
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_forward_matches_scenario_2() {
        #[rustfmt::skip]
        let x = Tensor::from_slice(
            &[
                -1.0, 0.0, 1.0, 2.0,
                1.0, 1.0, 1.0, 1.0,
                0.0, -0.3, -5.0, -0.5,
                -1.0, 10.0, -2.0, -1.0,
            ],
            1, 1, 4, 4,
        )
        .unwrap();
        let mut y = Tensor::new_zeroed(1, 1, 2, 2);
        pool_forward(&x, &mut y).unwrap();
        let expected = [1.0, 2.0, 10.0, -0.5];
        for (got, want) in y.as_slice().iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "got {got} want {want}");
        }
    }

    #[test]
    fn pool_backward_writes_single_nonzero_per_window() {
        let mut x = Tensor::from_slice(&[1.0, 5.0, 2.0, 3.0], 1, 1, 2, 2).unwrap();
        let dy = Tensor::from_slice(&[9.0], 1, 1, 1, 1).unwrap();
        pool_backward_in_place(&mut x, &dy).unwrap();
        // Max was at index 1 (value 5.0).
        assert_eq!(x.as_slice(), &[0.0, 9.0, 0.0, 0.0]);
    }

    #[test]
    fn pool_output_shape_is_ceil_half() {
        let x = Tensor::new_zeroed(1, 2, 5, 3);
        let mut y = Tensor::new_zeroed(1, 2, 3, 2);
        pool_forward(&x, &mut y).unwrap();
        assert_eq!(y.shape(), crate::tensor::Shape::new(1, 2, 3, 2));
    }
}
