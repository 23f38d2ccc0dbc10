//! Merge kernels for DAG networks: depth concatenation and sum.

use crate::errors::{CnnError, CnnResult};
use crate::tensor::{Shape, Tensor};

/// Concatenates `inputs` along the channel axis into `out`. All inputs must
/// share N, H, W; `out`'s channel count must equal the sum of the inputs'.
pub fn depth_concat_forward(inputs: &[&Tensor], out: &mut Tensor) -> CnnResult<()> {
    if inputs.is_empty() {
        return Err(CnnError::InvalidArgument("depth-concat requires at least one input".into()));
    }
    let (n, h, w) = {
        let s = inputs[0].shape();
        (s.n, s.h, s.w)
    };
    let mut total_c = 0;
    for t in inputs {
        let s = t.shape();
        if s.n != n || s.h != h || s.w != w {
            return Err(CnnError::ShapeMismatch {
                expected: vec![n, h, w],
                found: vec![s.n, s.h, s.w],
            });
        }
        total_c += s.c;
    }
    crate::kernels::require_shape_eq(Shape::new(n, total_c, h, w), out.shape())?;

    let out_arr = out.as_array4_mut();
    let mut c_offset = 0;
    for t in inputs {
        let c = t.shape().c;
        let src = t.as_array4();
        out_arr
            .slice_mut(ndarray::s![.., c_offset..c_offset + c, .., ..])
            .assign(src);
        c_offset += c;
    }
    Ok(())
}

/// Slices `dy` back into one gradient tensor per input, by the same
/// channel offsets used in the forward pass.
pub fn depth_concat_backward(input_shapes: &[Shape], dy: &Tensor) -> CnnResult<Vec<Tensor>> {
    let dy_arr = dy.as_array4();
    let mut outputs = Vec::with_capacity(input_shapes.len());
    let mut c_offset = 0;
    for &s in input_shapes {
        let mut grad = Tensor::new_zeroed(s.n, s.c, s.h, s.w);
        grad.as_array4_mut()
            .assign(&dy_arr.slice(ndarray::s![.., c_offset..c_offset + s.c, .., ..]));
        c_offset += s.c;
        outputs.push(grad);
    }
    Ok(outputs)
}

/// `Y = sum(inputs)`. All inputs and `out` must share the same shape.
pub fn sum_forward(inputs: &[&Tensor], out: &mut Tensor) -> CnnResult<()> {
    if inputs.is_empty() {
        return Err(CnnError::InvalidArgument("sum requires at least one input".into()));
    }
    for t in inputs {
        crate::kernels::require_shape_eq(out.shape(), t.shape())?;
    }
    let out_arr = out.as_array4_mut();
    out_arr.fill(0.0);
    for t in inputs {
        *out_arr += t.as_array4();
    }
    Ok(())
}

/// Each input receives an identical copy of `dY`.
pub fn sum_backward(count: usize, dy: &Tensor) -> Vec<Tensor> {
    (0..count).map(|_| dy.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_concat_round_trips_through_backward() {
        let a = Tensor::from_slice(&[1.0, 2.0], 1, 1, 1, 2).unwrap();
        let b = Tensor::from_slice(&[3.0, 4.0, 5.0, 6.0], 1, 2, 1, 2).unwrap();
        let mut out = Tensor::new_zeroed(1, 3, 1, 2);
        depth_concat_forward(&[&a, &b], &mut out).unwrap();
        assert_eq!(out.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let grads = depth_concat_backward(&[a.shape(), b.shape()], &out).unwrap();
        assert_eq!(grads[0].as_slice(), a.as_slice());
        assert_eq!(grads[1].as_slice(), b.as_slice());
    }

    #[test]
    fn sum_forward_adds_all_inputs() {
        let a = Tensor::from_slice(&[1.0, 2.0], 1, 1, 1, 2).unwrap();
        let b = Tensor::from_slice(&[10.0, 20.0], 1, 1, 1, 2).unwrap();
        let mut out = Tensor::new_zeroed(1, 1, 1, 2);
        sum_forward(&[&a, &b], &mut out).unwrap();
        assert_eq!(out.as_slice(), &[11.0, 22.0]);
    }

    #[test]
    fn sum_backward_copies_grad_to_each_input() {
        let dy = Tensor::from_slice(&[1.0, 2.0], 1, 1, 1, 2).unwrap();
        let grads = sum_backward(3, &dy);
        assert_eq!(grads.len(), 3);
        for g in grads {
            assert_eq!(g.as_slice(), dy.as_slice());
        }
    }
}
