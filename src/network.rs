use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{PlutusError, Result};
use crate::layers::{DenseLayer, LayerGradients};
use crate::optimizer::{GradientClipper, Optimizer, OptimizerWrapper};

/// Plain nested-array form of a network's parameters, used by the model blob.
///
/// `weights[l][i][j]` is the weight from input `i` to output `j` of layer `l`.
/// Values are widened to `f64` so their JSON text converts back to the exact
/// same `f32`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct NetworkParameters {
    pub weights: Vec<Vec<Vec<f64>>>,
    pub biases: Vec<Vec<f64>>,
}

impl NetworkParameters {
    pub fn layer_count(&self) -> usize {
        self.weights.len()
    }
}

/// A feed-forward network of dense layers with a hand-written backward pass.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NeuralNetwork {
    pub layers: Vec<DenseLayer>,
    pub optimizer: OptimizerWrapper,
    #[serde(default)]
    pub clipper: GradientClipper,
}

impl NeuralNetwork {
    /// Create a new neural network with the given layer sizes, activations, and optimizer.
    ///
    /// `layer_sizes` includes the input size, so `activations` holds one entry per
    /// layer, i.e. `layer_sizes.len() - 1` entries.
    pub fn new<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        activations: &[Activation],
        optimizer: OptimizerWrapper,
        rng: &mut R,
    ) -> Result<Self> {
        if layer_sizes.len() < 2 {
            return Err(PlutusError::invalid_parameter(
                "layer_sizes",
                "Network must have at least input and output layers",
            ));
        }
        if activations.len() != layer_sizes.len() - 1 {
            return Err(PlutusError::dimension_mismatch(
                format!("{} activations", layer_sizes.len() - 1),
                format!("{} activations", activations.len()),
            ));
        }

        let layers = layer_sizes
            .windows(2)
            .zip(activations.iter())
            .map(|(window, &activation)| DenseLayer::new(window[0], window[1], activation, rng))
            .collect::<Result<Vec<_>>>()?;

        Ok(NeuralNetwork {
            layers,
            optimizer,
            clipper: GradientClipper::None,
        })
    }

    /// Hidden layers use `hidden_activation`, the output layer is linear.
    pub fn with_hidden_activation<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        hidden_activation: Activation,
        optimizer: OptimizerWrapper,
        rng: &mut R,
    ) -> Result<Self> {
        let depth = layer_sizes.len().saturating_sub(1);
        let activations = (0..depth)
            .map(|i| if i + 1 == depth { Activation::Linear } else { hidden_activation })
            .collect::<Vec<_>>();
        Self::new(layer_sizes, &activations, optimizer, rng)
    }

    pub fn with_clipper(mut self, clipper: GradientClipper) -> Self {
        self.clipper = clipper;
        self
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, DenseLayer::input_size)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, DenseLayer::output_size)
    }

    /// Forward pass for a single input vector. Nothing is cached, so this can be
    /// used on a shared reference (e.g. the target network).
    pub fn predict(&self, input: ArrayView1<f32>) -> Array1<f32> {
        let mut current = input.to_owned();
        for layer in &self.layers {
            current = layer.predict(current.view());
        }
        current
    }

    /// Forward pass for a batch of row vectors, caching per-layer state for `backward`.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.input_size() {
            return Err(PlutusError::dimension_mismatch(
                format!("{} inputs", self.input_size()),
                format!("{} inputs", inputs.ncols()),
            ));
        }
        let mut current_output = inputs.to_owned();
        for layer in &mut self.layers {
            current_output = layer.forward_batch(current_output.view());
        }
        Ok(current_output)
    }

    /// Backpropagate `output_errors` (dLoss/dOutput, one row per sample) through
    /// the cached forward pass. Returns gradients in layer order.
    pub fn backward(&self, output_errors: ArrayView2<f32>) -> Result<Vec<LayerGradients>> {
        let mut gradients = Vec::with_capacity(self.layers.len());
        let mut current_error = output_errors.to_owned();

        for layer in self.layers.iter().rev() {
            let (input_error, layer_gradients) = layer.backward_batch(current_error.view())?;
            gradients.push(layer_gradients);
            current_error = input_error;
        }

        gradients.reverse();
        Ok(gradients)
    }

    /// Clip and apply one set of gradients through the optimizer. Returns the
    /// gradient norm before clipping.
    pub fn apply_gradients(&mut self, mut gradients: Vec<LayerGradients>, learning_rate: f32) -> Result<f32> {
        if gradients.len() != self.layers.len() {
            return Err(PlutusError::dimension_mismatch(
                format!("{} layer gradients", self.layers.len()),
                format!("{} layer gradients", gradients.len()),
            ));
        }
        let norm = self.clipper.clip(&mut gradients);
        if !norm.is_finite() {
            return Err(PlutusError::NumericalError(format!("gradient norm is {}", norm)));
        }

        self.optimizer.begin_step();
        for (index, (layer, grads)) in self.layers.iter_mut().zip(gradients.iter()).enumerate() {
            self.optimizer.update_weights(index, &mut layer.weights, &grads.weights, learning_rate);
            self.optimizer.update_biases(index, &mut layer.biases, &grads.biases, learning_rate);
        }
        Ok(norm)
    }

    /// One gradient step: forward, backpropagate the loss gradient produced by
    /// `output_gradient` from the batch outputs, and update.
    pub fn train_step<F>(&mut self, inputs: ArrayView2<f32>, learning_rate: f32, output_gradient: F) -> Result<f32>
    where
        F: FnOnce(&Array2<f32>) -> Array2<f32>,
    {
        let outputs = self.forward_batch(inputs)?;
        let errors = output_gradient(&outputs);
        if errors.dim() != outputs.dim() {
            return Err(PlutusError::dimension_mismatch(
                format!("{:?}", outputs.dim()),
                format!("{:?}", errors.dim()),
            ));
        }
        let gradients = self.backward(errors.view())?;
        self.apply_gradients(gradients, learning_rate)
    }

    /// Export weights and biases as nested arrays.
    pub fn parameters(&self) -> NetworkParameters {
        NetworkParameters {
            weights: self
                .layers
                .iter()
                .map(|layer| {
                    layer
                        .weights
                        .outer_iter()
                        .map(|row| row.iter().map(|&w| w as f64).collect())
                        .collect()
                })
                .collect(),
            biases: self
                .layers
                .iter()
                .map(|layer| layer.biases.iter().map(|&b| b as f64).collect())
                .collect(),
        }
    }

    /// Replace weights and biases with `parameters`, which must match this
    /// network's architecture exactly.
    pub fn load_parameters(&mut self, parameters: &NetworkParameters) -> Result<()> {
        if parameters.weights.len() != self.layers.len() || parameters.biases.len() != self.layers.len() {
            return Err(PlutusError::dimension_mismatch(
                format!("{} layers", self.layers.len()),
                format!("{} weight / {} bias layers", parameters.weights.len(), parameters.biases.len()),
            ));
        }

        let mut rebuilt = Vec::with_capacity(self.layers.len());
        for (layer, (rows, biases)) in self
            .layers
            .iter()
            .zip(parameters.weights.iter().zip(parameters.biases.iter()))
        {
            let (n_in, n_out) = layer.weights.dim();
            if rows.len() != n_in || rows.iter().any(|row| row.len() != n_out) || biases.len() != n_out {
                return Err(PlutusError::dimension_mismatch(
                    format!("{}x{} layer", n_in, n_out),
                    format!("{}x{} layer", rows.len(), rows.first().map_or(0, Vec::len)),
                ));
            }
            let flat: Vec<f32> = rows.iter().flatten().map(|&w| w as f32).collect();
            let weights = Array2::from_shape_vec((n_in, n_out), flat)
                .map_err(|e| PlutusError::dimension_mismatch(format!("{}x{}", n_in, n_out), e.to_string()))?;
            rebuilt.push(DenseLayer::from_parameters(
                weights,
                biases.iter().map(|&b| b as f32).collect::<Array1<f32>>(),
                layer.activation,
            )?);
        }

        self.layers = rebuilt;
        Ok(())
    }
}
