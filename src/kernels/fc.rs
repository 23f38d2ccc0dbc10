//! Fully-connected linear kernels. The activation applied on top of the
//! affine transform is handled by `kernels::activation`, composed at the
//! layer level — see `layers::fully_connected`.

use ndarray::Axis;

use crate::errors::CnnResult;
use crate::tensor::{Shape, Tensor};

/// `Y = X . W + b`, with `X`: (N, in), `W` stored as a Tensor of shape
/// `(in, out, 1, 1)` (so its "entities" view is the (in, out) matrix), `b`:
/// (1, out) row-broadcast across N.
pub fn fc_forward(x: &Tensor, weights: &Tensor, bias: &Tensor, out: &mut Tensor) -> CnnResult<()> {
    let n = x.shape().n;
    let x2 = x.as_entities();
    let w2 = weights.as_entities();
    let b2 = bias.as_entities();
    crate::kernels::require_shape_eq(Shape::flat(n, w2.dim().1), out.shape())?;
    let mut y2 = out.as_entities_mut();
    y2.assign(&x2.dot(&w2));
    y2 += &b2.broadcast((n, b2.dim().1)).unwrap();
    Ok(())
}

/// `dX = dY . W^T`.
pub fn fc_backward_data(dy: &Tensor, weights: &Tensor, dx: &mut Tensor) -> CnnResult<()> {
    let dy2 = dy.as_entities();
    let w2 = weights.as_entities();
    let mut dx2 = dx.as_entities_mut();
    dx2.assign(&dy2.dot(&w2.t()));
    Ok(())
}

/// `dW = X^T . dY`.
pub fn fc_backward_weights(x: &Tensor, dy: &Tensor, dw: &mut Tensor) -> CnnResult<()> {
    let x2 = x.as_entities();
    let dy2 = dy.as_entities();
    let mut dw2 = dw.as_entities_mut();
    dw2.assign(&x2.t().dot(&dy2));
    Ok(())
}

/// `db = column-sum(dY)`.
pub fn fc_backward_bias(dy: &Tensor, db: &mut Tensor) -> CnnResult<()> {
    let dy2 = dy.as_entities();
    let sums = dy2.sum_axis(Axis(0));
    let mut db2 = db.as_entities_mut();
    db2.row_mut(0).assign(&sums);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_weights_reproduce_scenario_1() {
        // FC in=2, out=2, W=I, b=0; X = [[1,2],[3,4]] -> Y = X.
        let x = Tensor::from_slice(&[1.0, 2.0, 3.0, 4.0], 2, 2, 1, 1).unwrap();
        let w = Tensor::from_slice(&[1.0, 0.0, 0.0, 1.0], 2, 2, 1, 1).unwrap();
        let b = Tensor::new_zeroed(1, 2, 1, 1);
        let mut y = Tensor::new_zeroed(2, 2, 1, 1);
        fc_forward(&x, &w, &b, &mut y).unwrap();
        assert_eq!(y.as_slice(), x.as_slice());

        let dy = Tensor::from_slice(&[1.0, 0.0, 0.0, 1.0], 2, 2, 1, 1).unwrap();
        let mut dw = Tensor::new_zeroed(2, 2, 1, 1);
        fc_backward_weights(&x, &dy, &mut dw).unwrap();
        // dW = X^T . I = X^T
        assert_eq!(dw.as_slice(), &[1.0, 3.0, 2.0, 4.0]);

        let mut db = Tensor::new_zeroed(1, 2, 1, 1);
        fc_backward_bias(&dy, &mut db).unwrap();
        assert_eq!(db.as_slice(), &[1.0, 1.0]);

        let mut dx = Tensor::new_zeroed(2, 2, 1, 1);
        fc_backward_data(&dy, &w, &mut dx).unwrap();
        assert_eq!(dx.as_slice(), dy.as_slice());
    }
}
