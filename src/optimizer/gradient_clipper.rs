use serde::{Serialize, Deserialize};

use crate::layers::LayerGradients;

/// Gradient clipping applied to a full set of layer gradients before the optimizer runs
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum GradientClipper {
    /// Clip every gradient element into `[min, max]`
    ClipByValue { min: f32, max: f32 },

    /// Rescale all gradients so their combined L2 norm is at most `max_norm`
    ClipByGlobalNorm { max_norm: f32 },

    /// No clipping
    #[default]
    None,
}

impl GradientClipper {
    /// Compute global norm of all gradients
    pub fn global_norm(gradients: &[LayerGradients]) -> f32 {
        gradients
            .iter()
            .map(|g| {
                g.weights.iter().map(|&x| x * x).sum::<f32>()
                    + g.biases.iter().map(|&x| x * x).sum::<f32>()
            })
            .sum::<f32>()
            .sqrt()
    }

    /// Clip the gradients in place, returning the norm measured before clipping
    pub fn clip(&self, gradients: &mut [LayerGradients]) -> f32 {
        let norm = Self::global_norm(gradients);
        match *self {
            GradientClipper::ClipByValue { min, max } => {
                for grad in gradients.iter_mut() {
                    grad.weights.mapv_inplace(|g| g.max(min).min(max));
                    grad.biases.mapv_inplace(|g| g.max(min).min(max));
                }
            }

            GradientClipper::ClipByGlobalNorm { max_norm } => {
                if norm > max_norm && norm > 0.0 {
                    let scale = max_norm / norm;
                    for grad in gradients.iter_mut() {
                        grad.weights.mapv_inplace(|g| g * scale);
                        grad.biases.mapv_inplace(|g| g * scale);
                    }
                }
            }

            GradientClipper::None => {}
        }
        norm
    }
}
