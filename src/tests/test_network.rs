use ndarray::{array, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use crate::activations::Activation;
use crate::error::PlutusError;
use crate::loss::{HuberLoss, Loss, MSE};
use crate::network::{NetworkParameters, NeuralNetwork};
use crate::optimizer::{Adam, GradientClipper, OptimizerWrapper, SGD};

fn regression_data() -> (Array2<f32>, Vec<f32>) {
    let inputs = array![[0.0, 1.0], [1.0, 0.0], [0.5, 0.5], [1.0, 1.0], [0.2, 0.8]];
    let targets = inputs.outer_iter().map(|row| 2.0 * row[0] - row[1] + 0.5).collect();
    (inputs, targets)
}

fn mse(network: &NeuralNetwork, inputs: &Array2<f32>, targets: &[f32]) -> f32 {
    let errors: Vec<f32> = inputs
        .outer_iter()
        .zip(targets)
        .map(|(row, &t)| network.predict(row)[0] - t)
        .collect();
    MSE.mean(&errors)
}

#[test]
fn test_network_shapes() {
    let network = NeuralNetwork::with_hidden_activation(
        &[3, 4, 2],
        Activation::Relu,
        OptimizerWrapper::SGD(SGD::new()),
        &mut StdRng::seed_from_u64(1),
    )
    .unwrap();

    assert_eq!(network.layers.len(), 2);
    assert_eq!(network.layers[0].weights.shape(), [3, 4]);
    assert_eq!(network.layers[1].biases.shape(), [2]);
    assert_eq!(network.layers[1].activation, Activation::Linear);
    assert_eq!((network.input_size(), network.output_size()), (3, 2));
}

#[test]
fn test_invalid_architectures() {
    let mut rng = StdRng::seed_from_u64(1);
    let sgd = || OptimizerWrapper::SGD(SGD::new());
    assert!(NeuralNetwork::new(&[3], &[], sgd(), &mut rng).is_err());
    assert!(matches!(
        NeuralNetwork::new(&[3, 4, 2], &[Activation::Relu], sgd(), &mut rng),
        Err(PlutusError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_forward_batch_rejects_wrong_width() {
    let mut network = NeuralNetwork::with_hidden_activation(
        &[3, 2],
        Activation::Relu,
        OptimizerWrapper::SGD(SGD::new()),
        &mut StdRng::seed_from_u64(1),
    )
    .unwrap();
    assert!(network.forward_batch(array![[1.0, 2.0]].view()).is_err());
}

#[test]
fn test_train_step_reduces_loss() {
    let (inputs, targets) = regression_data();
    let mut network = NeuralNetwork::with_hidden_activation(
        &[2, 8, 1],
        Activation::Tanh,
        OptimizerWrapper::Adam(Adam::default()),
        &mut StdRng::seed_from_u64(5),
    )
    .unwrap();

    let before = mse(&network, &inputs, &targets);
    for _ in 0..300 {
        network
            .train_step(inputs.view(), 0.01, |outputs| {
                let n = outputs.nrows() as f32;
                let mut grad = Array2::zeros(outputs.dim());
                for (i, &t) in targets.iter().enumerate() {
                    grad[[i, 0]] = MSE.gradient(outputs[[i, 0]] - t) / n;
                }
                grad
            })
            .unwrap();
    }
    let after = mse(&network, &inputs, &targets);
    assert!(after < before * 0.25, "loss went from {} to {}", before, after);
}

#[test]
fn test_clipper_reports_unclipped_norm() {
    let mut network = NeuralNetwork::with_hidden_activation(
        &[2, 1],
        Activation::Linear,
        OptimizerWrapper::SGD(SGD::new()),
        &mut StdRng::seed_from_u64(2),
    )
    .unwrap()
    .with_clipper(GradientClipper::ClipByGlobalNorm { max_norm: 0.1 });

    let before = network.layers[0].weights.clone();
    let norm = network
        .train_step(array![[3.0, 4.0]].view(), 1.0, |outputs| Array2::ones(outputs.dim()))
        .unwrap();

    // Gradients are [3, 4] for the weights and 1 for the bias
    assert!((norm - 26.0f32.sqrt()).abs() < 1e-4);
    let moved: f32 = (&network.layers[0].weights - &before).iter().map(|d| d * d).sum::<f32>();
    assert!(moved.sqrt() <= 0.1 + 1e-5);
}

#[test]
fn test_parameters_survive_json_bit_for_bit() {
    let network = NeuralNetwork::with_hidden_activation(
        &[5, 7, 3],
        Activation::Relu,
        OptimizerWrapper::SGD(SGD::new()),
        &mut StdRng::seed_from_u64(99),
    )
    .unwrap();

    let json = serde_json::to_string(&network.parameters()).unwrap();
    let restored: NetworkParameters = serde_json::from_str(&json).unwrap();
    let mut other = NeuralNetwork::with_hidden_activation(
        &[5, 7, 3],
        Activation::Relu,
        OptimizerWrapper::SGD(SGD::new()),
        &mut StdRng::seed_from_u64(100),
    )
    .unwrap();
    other.load_parameters(&restored).unwrap();

    let input = array![0.3, -1.2, 0.01, 7.5, -0.25];
    let a = network.predict(input.view());
    let b = other.predict(input.view());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.to_bits(), y.to_bits());
    }
}

#[test]
fn test_huber_is_bounded_where_mse_is_not() {
    let huber = HuberLoss::default();
    assert_eq!(huber.gradient(10.0), 1.0);
    assert_eq!(huber.gradient(-10.0), -1.0);
    assert!((huber.gradient(0.5) - 0.5).abs() < 1e-6);
    assert!(MSE.gradient(10.0) > 1.0);
}
