pub mod gradient_clipper;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Array1};
use serde::{Serialize, Deserialize};

use crate::error::PlutusError;

pub use gradient_clipper::GradientClipper;

/// Parameter update rule applied layer by layer.
///
/// `begin_step` is called once per gradient step, before any layer is updated,
/// so stateful optimizers can advance their time step exactly once.
pub trait Optimizer {
    fn begin_step(&mut self) {}
    fn update_weights(&mut self, layer: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32);
    fn update_biases(&mut self, layer: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32);
}

/// Optimizer identifiers accepted in configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl FromStr for OptimizerKind {
    type Err = PlutusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            other => Err(PlutusError::UnknownOptimizer(other.to_string())),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Sgd => write!(f, "sgd"),
            OptimizerKind::Adam => write!(f, "adam"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
}

impl OptimizerWrapper {
    pub fn from_kind(kind: OptimizerKind) -> Self {
        match kind {
            OptimizerKind::Sgd => OptimizerWrapper::SGD(SGD::new()),
            OptimizerKind::Adam => OptimizerWrapper::Adam(Adam::default()),
        }
    }

    pub fn kind(&self) -> OptimizerKind {
        match self {
            OptimizerWrapper::SGD(_) => OptimizerKind::Sgd,
            OptimizerWrapper::Adam(_) => OptimizerKind::Adam,
        }
    }
}

impl Optimizer for OptimizerWrapper {
    fn begin_step(&mut self) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.begin_step(),
            OptimizerWrapper::Adam(optimizer) => optimizer.begin_step(),
        }
    }

    fn update_weights(&mut self, layer: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update_weights(layer, weights, gradients, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update_weights(layer, weights, gradients, learning_rate),
        }
    }

    fn update_biases(&mut self, layer: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update_biases(layer, biases, gradients, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update_biases(layer, biases, gradients, learning_rate),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Default for SGD {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer for SGD {
    fn update_weights(&mut self, _layer: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        weights.zip_mut_with(gradients, |w, &g| *w -= learning_rate * g);
    }

    fn update_biases(&mut self, _layer: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        biases.zip_mut_with(gradients, |b, &g| *b -= learning_rate * g);
    }
}

/// First and second moment estimates for one layer
#[derive(Serialize, Deserialize, Clone, Debug)]
struct Moments {
    m_weights: Array2<f32>,
    v_weights: Array2<f32>,
    m_biases: Array1<f32>,
    v_biases: Array1<f32>,
}

impl Moments {
    fn zeros(weights: (usize, usize), biases: usize) -> Self {
        Moments {
            m_weights: Array2::zeros(weights),
            v_weights: Array2::zeros(weights),
            m_biases: Array1::zeros(biases),
            v_biases: Array1::zeros(biases),
        }
    }
}

/// Adam with bias-corrected moment estimates.
///
/// Moment buffers are created lazily per layer index the first time a layer
/// is updated, so the optimizer can be built before the network it drives.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    moments: Vec<Option<Moments>>,
    pub t: u32,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            moments: Vec::new(),
            t: 0,
        }
    }

    fn moments_for(&mut self, layer: usize, weights: (usize, usize), biases: usize) -> &mut Moments {
        if self.moments.len() <= layer {
            self.moments.resize(layer + 1, None);
        }
        let slot = &mut self.moments[layer];
        let stale = slot
            .as_ref()
            .map_or(true, |m| m.m_weights.dim() != weights || m.m_biases.len() != biases);
        if stale {
            *slot = Some(Moments::zeros(weights, biases));
        }
        slot.get_or_insert_with(|| Moments::zeros(weights, biases))
    }

    fn corrections(&self) -> (f32, f32) {
        let t = self.t.max(1) as i32;
        (1.0 - self.beta1.powi(t), 1.0 - self.beta2.powi(t))
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update_weights(&mut self, layer: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let (c1, c2) = self.corrections();
        let bias_len = weights.ncols();
        let m = self.moments_for(layer, weights.dim(), bias_len);

        m.m_weights.zip_mut_with(gradients, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        m.v_weights.zip_mut_with(gradients, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        ndarray::Zip::from(weights)
            .and(&m.m_weights)
            .and(&m.v_weights)
            .for_each(|w, &m, &v| {
                let m_hat = m / c1;
                let v_hat = v / c2;
                *w -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            });
    }

    fn update_biases(&mut self, layer: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let (c1, c2) = self.corrections();
        let existing = self
            .moments
            .get(layer)
            .and_then(|m| m.as_ref())
            .map(|m| m.m_weights.dim());
        let weight_dim = existing.unwrap_or((0, biases.len()));
        let m = self.moments_for(layer, weight_dim, biases.len());

        m.m_biases.zip_mut_with(gradients, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        m.v_biases.zip_mut_with(gradients, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        ndarray::Zip::from(biases)
            .and(&m.m_biases)
            .and(&m.v_biases)
            .for_each(|b, &m, &v| {
                let m_hat = m / c1;
                let v_hat = v / c2;
                *b -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            });
    }
}
