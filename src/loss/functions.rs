use serde::{Serialize, Deserialize};

/// Loss applied element-wise to a prediction error `prediction - target`.
///
/// The learners only ever penalise one output per sample (the taken action's
/// Q-value, or the critic's scalar value), so the losses work on scalars.
pub trait Loss {
    /// Loss for a single error
    fn value(&self, error: f32) -> f32;

    /// Derivative of the loss with respect to the prediction
    fn gradient(&self, error: f32) -> f32;

    /// Mean loss over a set of errors
    fn mean(&self, errors: &[f32]) -> f32 {
        if errors.is_empty() {
            return 0.0;
        }
        errors.iter().map(|&e| self.value(e)).sum::<f32>() / errors.len() as f32
    }
}

/// Half mean squared error, `0.5 * e^2`
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MSE;

impl Loss for MSE {
    fn value(&self, error: f32) -> f32 {
        0.5 * error * error
    }

    fn gradient(&self, error: f32) -> f32 {
        error
    }
}

/// Huber loss (smooth L1): quadratic inside `delta`, linear beyond
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct HuberLoss {
    pub delta: f32,
}

impl HuberLoss {
    pub fn new(delta: f32) -> Self {
        HuberLoss { delta }
    }
}

impl Default for HuberLoss {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Loss for HuberLoss {
    fn value(&self, error: f32) -> f32 {
        let abs_x = error.abs();
        if abs_x <= self.delta {
            0.5 * error * error
        } else {
            self.delta * abs_x - 0.5 * self.delta * self.delta
        }
    }

    fn gradient(&self, error: f32) -> f32 {
        if error.abs() <= self.delta {
            error
        } else {
            self.delta * error.signum()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huber_quadratic_then_linear() {
        let huber = HuberLoss::default();
        assert!((huber.value(0.5) - 0.125).abs() < 1e-7);
        assert!((huber.value(3.0) - 2.5).abs() < 1e-7);
        assert_eq!(huber.gradient(0.5), 0.5);
        assert_eq!(huber.gradient(-3.0), -1.0);
        assert_eq!(huber.gradient(1.0), 1.0);
    }

    #[test]
    fn test_mse_mean() {
        assert!((MSE.mean(&[1.0, -1.0, 2.0]) - 1.0).abs() < 1e-7);
        assert_eq!(MSE.mean(&[]), 0.0);
    }
}
