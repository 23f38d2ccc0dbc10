use cnn_core::batch::BatchCollection;
use cnn_core::Tensor;

#[test]
fn from_dataset_rejects_zero_batch_size() {
    let x = Tensor::new_zeroed(4, 1, 1, 1);
    let y = Tensor::new_zeroed(4, 1, 1, 1);
    assert!(BatchCollection::from_dataset(&x, &y, 0).is_err());
}

#[test]
fn from_dataset_rejects_mismatched_sample_counts() {
    let x = Tensor::new_zeroed(4, 1, 1, 1);
    let y = Tensor::new_zeroed(3, 1, 1, 1);
    assert!(BatchCollection::from_dataset(&x, &y, 2).is_err());
}

#[test]
fn cross_shuffle_preserves_the_row_multiset_across_batches() {
    let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let x = Tensor::from_slice(&values, 12, 1, 1, 1).unwrap();
    let y = x.clone();
    let mut batches = BatchCollection::from_dataset(&x, &y, 4).unwrap();

    batches.cross_shuffle(42);

    let mut seen: Vec<f32> = batches
        .batches
        .iter()
        .flat_map(|b| b.x.as_slice().to_vec())
        .collect();
    seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(seen, values);
}
