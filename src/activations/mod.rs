//! # Activation Functions Module
//!
//! Activation functions applied after every dense layer of the value and
//! policy networks.
//!
//! ## Available Activations
//!
//! - **ReLU** (Rectified Linear Unit): `max(0, x)` - default for hidden layers
//! - **Sigmoid**: `1 / (1 + e^(-x))` - Outputs between 0 and 1
//! - **Tanh**: Hyperbolic tangent - Outputs between -1 and 1
//! - **Linear**: Identity function - used for Q-value, logit and value heads
//! - **LeakyReLU**: ReLU with small negative slope - Prevents dead neurons
//!
//! ## Usage Example
//!
//! ```rust
//! use plutus::activations::Activation;
//! use ndarray::array;
//!
//! let relu = Activation::Relu;
//! let mut data = array![1.0, -0.5, 0.0, 2.0];
//! relu.apply(&mut data);
//! assert_eq!(data, array![1.0, 0.0, 0.0, 2.0]);
//! ```

pub mod functions;

pub use functions::Activation;
