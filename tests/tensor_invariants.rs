use cnn_core::{Shape, Tensor};

#[test]
fn overwrite_copies_data_without_changing_shape() {
    let mut x = Tensor::new_zeroed(2, 2, 1, 1);
    let y = Tensor::from_slice(&[1.0, 2.0, 3.0, 4.0], 2, 2, 1, 1).unwrap();
    x.overwrite(&y).unwrap();
    assert_eq!(x.shape(), Shape::new(2, 2, 1, 1));
    assert_eq!(x.as_slice(), y.as_slice());
}

#[test]
fn overwrite_rejects_shape_mismatch() {
    let mut x = Tensor::new_zeroed(2, 2, 1, 1);
    let y = Tensor::new_zeroed(1, 4, 1, 1);
    assert!(x.overwrite(&y).is_err());
}

#[test]
fn subtracting_a_tensor_from_itself_is_zero() {
    let x = Tensor::from_slice(&[1.0, -2.0, 3.5, 0.25], 1, 4, 1, 1).unwrap();
    let zero = &x - &x;
    assert!(zero.as_slice().iter().all(|&v| v == 0.0));
}
