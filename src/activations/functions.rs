use ndarray::{Array1, Array2, ArrayView2};
use serde::{Serialize, Deserialize};

/// An enumeration of the possible activation functions that can be used in a neural network layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Relu,
    Linear,
    Sigmoid,
    Tanh,
    LeakyRelu { alpha: f32 },
}

impl Activation {
    fn value(&self, v: f32) -> f32 {
        match self {
            Activation::Relu => v.max(0.0),
            Activation::Linear => v,
            Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
            Activation::Tanh => v.tanh(),
            Activation::LeakyRelu { alpha } => if v > 0.0 { v } else { alpha * v },
        }
    }

    fn slope(&self, v: f32) -> f32 {
        match self {
            Activation::Relu => if v > 0.0 { 1.0 } else { 0.0 },
            Activation::Linear => 1.0,
            Activation::Sigmoid => {
                let sigmoid = 1.0 / (1.0 + (-v).exp());
                sigmoid * (1.0 - sigmoid)
            }
            Activation::Tanh => {
                let tanh_v = v.tanh();
                1.0 - tanh_v * tanh_v
            }
            Activation::LeakyRelu { alpha } => if v > 0.0 { 1.0 } else { *alpha },
        }
    }

    /// Apply the activation function to an input array in-place.
    pub fn apply(&self, input: &mut Array1<f32>) {
        if !matches!(self, Activation::Linear) {
            input.mapv_inplace(|v| self.value(v));
        }
    }

    /// Apply the activation function to a batch of input arrays in-place.
    pub fn apply_batch(&self, inputs: &mut Array2<f32>) {
        if !matches!(self, Activation::Linear) {
            inputs.mapv_inplace(|v| self.value(v));
        }
    }

    /// Compute the derivative of the activation function for an input array.
    pub fn derivative(&self, input: &Array1<f32>) -> Array1<f32> {
        input.mapv(|v| self.slope(v))
    }

    /// Compute the derivative of the activation function for a batch of
    /// pre-activation values.
    pub fn derivative_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Activation::Linear => Array2::ones(inputs.dim()),
            _ => inputs.mapv(|v| self.slope(v)),
        }
    }
}
