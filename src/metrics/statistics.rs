use serde::{Serialize, Deserialize};

/// Summary of a set of values
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub mean: f32,
    /// Population standard deviation
    pub std: f32,
    pub min: f32,
    pub max: f32,
    pub count: usize,
}

impl Statistics {
    /// All fields are zero for an empty input
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f32>,
    {
        let values: Vec<f32> = values.into_iter().collect();
        if values.is_empty() {
            return Statistics::default();
        }

        let count = values.len();
        let mean = values.iter().sum::<f32>() / count as f32;
        let variance = values.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / count as f32;

        Statistics {
            mean,
            std: variance.sqrt(),
            min: values.iter().copied().fold(f32::INFINITY, f32::min),
            max: values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            count,
        }
    }
}

/// Welford running mean/variance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
    min: f32,
    max: f32,
}

impl RunningStats {
    pub fn new() -> Self {
        RunningStats {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
        }
    }

    pub fn update(&mut self, value: f32) {
        self.count += 1;
        let delta = value as f64 - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value as f64 - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> f32 {
        self.mean as f32
    }

    /// Sample variance, zero below two observations
    pub fn variance(&self) -> f32 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64) as f32
        }
    }

    pub fn std(&self) -> f32 {
        self.variance().sqrt()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn to_statistics(&self) -> Statistics {
        if self.count == 0 {
            return Statistics::default();
        }
        Statistics {
            mean: self.mean(),
            std: self.std(),
            min: self.min,
            max: self.max,
            count: self.count,
        }
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_from_values() {
        let stats = Statistics::from_values([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert!((stats.std - 1.118034).abs() < 1e-5);
        assert_eq!(Statistics::from_values(Vec::new()), Statistics::default());
    }

    #[test]
    fn test_running_stats_matches_batch_mean() {
        let mut running = RunningStats::new();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            running.update(v);
        }
        assert!((running.mean() - 5.0).abs() < 1e-6);
        assert!((running.variance() - 32.0 / 7.0).abs() < 1e-5);
        assert_eq!(running.to_statistics().count, 8);
    }
}
