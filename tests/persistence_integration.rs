use cnn_core::io::{load_network, save_network};
use cnn_core::layers::{FullyConnectedLayer, InceptionLayer, Layer, OutputLayer};
use cnn_core::types::ActivationKind;
use cnn_core::{CostKind, Shape, Tensor};

#[test]
fn a_saved_chain_loads_back_with_identical_weights_and_cost() {
    let layers = vec![
        Layer::FullyConnected(FullyConnectedLayer::new(1, 4, 3, ActivationKind::Relu)),
        Layer::FullyConnected(FullyConnectedLayer::new(1, 3, 2, ActivationKind::Identity)),
        Layer::Output(OutputLayer::new(Shape::flat(1, 2), ActivationKind::Sigmoid)),
    ];

    let mut buf = Vec::new();
    save_network(&mut buf, &layers, CostKind::CrossEntropy).unwrap();

    let mut cursor = std::io::Cursor::new(buf);
    let (loaded, cost) = load_network(&mut cursor).unwrap();

    assert_eq!(cost, CostKind::CrossEntropy);
    assert_eq!(loaded.len(), layers.len());
    for (original, reloaded) in layers.iter().zip(loaded.iter()) {
        assert_eq!(original.input_shape(), reloaded.input_shape());
        assert_eq!(original.output_shape(), reloaded.output_shape());
    }
}

#[test]
fn an_inception_layer_is_rejected_from_persistence() {
    let branch = vec![Layer::FullyConnected(FullyConnectedLayer::new(1, 4, 2, ActivationKind::Relu))];
    let inception = InceptionLayer::new(Shape::flat(1, 4), vec![branch], ActivationKind::Identity).unwrap();
    let layers = vec![Layer::Inception(inception)];

    let mut buf = Vec::new();
    assert!(save_network(&mut buf, &layers, CostKind::Quadratic).is_err());
}

#[test]
fn loading_a_truncated_buffer_fails_cleanly() {
    let mut cursor = std::io::Cursor::new(vec![b'C', b'N', b'N', b'C']);
    assert!(load_network(&mut cursor).is_err());
}
