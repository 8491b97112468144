use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{PlutusError, Result};
use super::initialization::WeightInit;

/// Gradients of one dense layer, laid out like the layer's own parameters
#[derive(Clone, Debug)]
pub struct LayerGradients {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

/// A fully connected (dense) layer in a neural network.
///
/// Weights are stored as an `input_size × output_size` matrix so a batch of
/// row vectors is propagated with a single `inputs.dot(&weights)`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    #[serde(skip)]
    pre_activation_output: Option<Array2<f32>>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
}

impl DenseLayer {
    /// Create a new dense layer with the given input size, output size, and activation function.
    /// Weights are drawn with the initialization recommended for the activation; biases start at zero.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        let init = WeightInit::for_activation(&activation);
        Self::with_init(input_size, output_size, activation, init, rng)
    }

    pub fn with_init<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        let weights = init.initialize_weights((input_size, output_size), rng)?;
        let biases = init.initialize_biases(output_size);
        Ok(DenseLayer {
            weights,
            biases,
            activation,
            pre_activation_output: None,
            inputs: None,
        })
    }

    /// Build a layer from explicit parameters, checking that the shapes agree.
    pub fn from_parameters(weights: Array2<f32>, biases: Array1<f32>, activation: Activation) -> Result<Self> {
        if weights.ncols() != biases.len() {
            return Err(PlutusError::dimension_mismatch(
                format!("{} biases", weights.ncols()),
                format!("{} biases", biases.len()),
            ));
        }
        Ok(DenseLayer {
            weights,
            biases,
            activation,
            pre_activation_output: None,
            inputs: None,
        })
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    /// Forward pass for a single input vector without caching anything.
    pub fn predict(&self, input: ArrayView1<f32>) -> Array1<f32> {
        let mut output = input.dot(&self.weights) + &self.biases;
        self.activation.apply(&mut output);
        output
    }

    /// Forward pass for a batch, caching the inputs and pre-activations for `backward_batch`.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Array2<f32> {
        self.inputs = Some(inputs.to_owned());
        let mut outputs = inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0));
        self.pre_activation_output = Some(outputs.clone());
        self.activation.apply_batch(&mut outputs);
        outputs
    }

    /// Backpropagate the loss gradient w.r.t. this layer's outputs.
    ///
    /// Returns the gradient w.r.t. the layer's inputs along with the parameter gradients.
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<(Array2<f32>, LayerGradients)> {
        let (pre_activation_output, inputs) = match (&self.pre_activation_output, &self.inputs) {
            (Some(pre), Some(inputs)) => (pre, inputs),
            _ => {
                return Err(PlutusError::NumericalError(
                    "forward_batch() must be called before backward_batch()".to_string(),
                ))
            }
        };
        if output_errors.dim() != pre_activation_output.dim() {
            return Err(PlutusError::dimension_mismatch(
                format!("{:?}", pre_activation_output.dim()),
                format!("{:?}", output_errors.dim()),
            ));
        }

        let activation_deriv = self.activation.derivative_batch(pre_activation_output.view());
        let adjusted_error = &output_errors * &activation_deriv;
        let weights = inputs.t().dot(&adjusted_error);
        let biases = adjusted_error.sum_axis(Axis(0));
        let input_error = adjusted_error.dot(&self.weights.t());

        Ok((input_error, LayerGradients { weights, biases }))
    }
}
