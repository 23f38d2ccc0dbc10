use cnn_core::layers::{FullyConnectedLayer, Layer, OutputLayer};
use cnn_core::network::{Dag, TrainableNetwork};
use cnn_core::optim::{Optimizer, Sgd};
use cnn_core::types::ActivationKind;
use cnn_core::{CostKind, Shape, Tensor};

#[test]
fn two_branches_summed_then_trained_end_to_end() {
    let mut dag = Dag::new();
    let input = dag.add_input();
    let left = dag
        .add_layer(Layer::FullyConnected(FullyConnectedLayer::new(1, 4, 3, ActivationKind::Relu)), input)
        .unwrap();
    let right = dag
        .add_layer(Layer::FullyConnected(FullyConnectedLayer::new(1, 4, 3, ActivationKind::Relu)), input)
        .unwrap();
    let merged = dag.add_sum(ActivationKind::Identity, vec![left, right]).unwrap();
    let out = dag
        .add_layer(Layer::FullyConnected(FullyConnectedLayer::new(1, 3, 1, ActivationKind::Identity)), merged)
        .unwrap();
    let output = dag.add_layer(Layer::Output(OutputLayer::new(Shape::flat(1, 1), ActivationKind::Sigmoid)), out).unwrap();
    dag.set_output(output);

    let x = Tensor::from_slice(&[0.1, 0.2, -0.3, 0.4], 1, 4, 1, 1).unwrap();
    let y = Tensor::from_slice(&[1.0], 1, 1, 1, 1).unwrap();
    let mut optimizer = Sgd::new(0.05);

    for _ in 0..10 {
        dag.train_step(&x, &y, CostKind::Quadratic, &mut |idx, layer, dw, db, batch_size| {
            if let Some((w, b)) = layer.weights_mut() {
                optimizer.step(idx, w, b, dw, db, batch_size);
            }
        })
        .unwrap();
    }

    let y_hat = dag.forward(&x, false).unwrap();
    assert_eq!(y_hat.shape(), y.shape());
}

#[test]
fn add_sum_rejects_a_single_parent() {
    let mut dag = Dag::new();
    let input = dag.add_input();
    assert!(dag.add_sum(ActivationKind::Identity, vec![input]).is_err());
}

#[test]
fn add_layer_rejects_an_unknown_parent() {
    let mut dag = Dag::new();
    dag.add_input();
    let bogus = cnn_core::types::NodeId(999);
    let layer = Layer::FullyConnected(FullyConnectedLayer::new(1, 2, 2, ActivationKind::Relu));
    assert!(dag.add_layer(layer, bogus).is_err());
}
