use rand::seq::index;
use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::trace;

use crate::error::{PlutusError, Result};
use crate::types::Experience;

/// How mini-batches are drawn from the store
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SamplingMode {
    /// Uniform sampling without replacement
    Uniform,
    /// Sampling with replacement, probability proportional to `priority^alpha`
    Prioritized { alpha: f32, beta: f32 },
}

/// A sampled mini-batch. `weights` are the max-normalised importance-sampling
/// weights (all `1.0` for uniform sampling).
#[derive(Debug)]
pub struct SampledBatch<'a> {
    pub indices: Vec<usize>,
    pub experiences: Vec<&'a Experience>,
    pub weights: Vec<f32>,
}

impl<'a> SampledBatch<'a> {
    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }
}

/// Fixed-capacity ring of experiences.
///
/// The `n`-th insertion (0-based) lands in slot `n mod capacity`, overwriting
/// whatever was there; the store never holds more than `capacity` items.
/// In prioritized mode a priority array of the same capacity runs in parallel.
#[derive(Clone, Debug)]
pub struct ExperienceStore {
    slots: Vec<Experience>,
    priorities: Option<Vec<f32>>,
    capacity: usize,
    insert_count: u64,
    mode: SamplingMode,
    max_priority: f32,
    priority_epsilon: f32,
}

impl ExperienceStore {
    pub fn new(capacity: usize, mode: SamplingMode) -> Result<Self> {
        if capacity == 0 {
            return Err(PlutusError::invalid_parameter("capacity", "must be at least 1"));
        }
        let priorities = match mode {
            SamplingMode::Uniform => None,
            SamplingMode::Prioritized { .. } => Some(vec![0.0; capacity]),
        };
        Ok(ExperienceStore {
            slots: Vec::with_capacity(capacity),
            priorities,
            capacity,
            insert_count: 0,
            mode,
            max_priority: 1.0,
            priority_epsilon: 1e-3,
        })
    }

    pub fn uniform(capacity: usize) -> Result<Self> {
        Self::new(capacity, SamplingMode::Uniform)
    }

    /// Insert an experience, returning the ring slot it was written to.
    /// New experiences get the largest priority seen so far.
    pub fn push(&mut self, experience: Experience) -> usize {
        let slot = (self.insert_count % self.capacity as u64) as usize;
        if self.slots.len() < self.capacity {
            self.slots.push(experience);
        } else {
            self.slots[slot] = experience;
        }
        if let Some(priorities) = self.priorities.as_mut() {
            priorities[slot] = self.max_priority;
        }
        self.insert_count += 1;
        slot
    }

    pub fn get(&self, slot: usize) -> Option<&Experience> {
        self.slots.get(slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of insertions, including overwritten ones
    pub fn insert_count(&self) -> u64 {
        self.insert_count
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    pub fn priority(&self, slot: usize) -> Option<f32> {
        if slot >= self.slots.len() {
            return None;
        }
        self.priorities.as_ref().map(|p| p[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.slots.iter()
    }

    /// Draw a mini-batch. Returns `None` while the store holds fewer than
    /// `batch_size` experiences; callers simply retry on a later step.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Option<SampledBatch<'_>> {
        if batch_size == 0 || self.slots.len() < batch_size {
            trace!(held = self.slots.len(), batch_size, "replay store not ready");
            return None;
        }

        match (self.mode, self.priorities.as_ref()) {
            (SamplingMode::Prioritized { alpha, beta }, Some(priorities)) => {
                Some(self.sample_prioritized(batch_size, alpha, beta, &priorities[..self.slots.len()], rng))
            }
            _ => {
                let indices = index::sample(rng, self.slots.len(), batch_size).into_vec();
                let experiences = indices.iter().map(|&i| &self.slots[i]).collect();
                Some(SampledBatch {
                    indices,
                    experiences,
                    weights: vec![1.0; batch_size],
                })
            }
        }
    }

    fn sample_prioritized<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        alpha: f32,
        beta: f32,
        priorities: &[f32],
        rng: &mut R,
    ) -> SampledBatch<'_> {
        let mut cumulative = Vec::with_capacity(priorities.len());
        let mut total = 0.0f64;
        for &p in priorities {
            total += (p.max(self.priority_epsilon) as f64).powf(alpha as f64);
            cumulative.push(total);
        }

        let n = priorities.len() as f64;
        let mut indices = Vec::with_capacity(batch_size);
        let mut weights = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let draw = rng.gen::<f64>() * total;
            let i = cumulative.partition_point(|&c| c <= draw).min(priorities.len() - 1);
            let mass = cumulative[i] - if i == 0 { 0.0 } else { cumulative[i - 1] };
            let probability = mass / total;
            indices.push(i);
            weights.push((n * probability).powf(-(beta as f64)) as f32);
        }

        let max_weight = weights.iter().fold(0.0f32, |max, &w| max.max(w));
        if max_weight > 0.0 {
            for w in weights.iter_mut() {
                *w /= max_weight;
            }
        }

        let experiences = indices.iter().map(|&i| &self.slots[i]).collect();
        SampledBatch {
            indices,
            experiences,
            weights,
        }
    }

    /// Set the priorities of sampled slots to `|td_error| + epsilon`.
    /// Does nothing in uniform mode.
    pub fn update_priorities(&mut self, slots: &[usize], td_errors: &[f32]) {
        let epsilon = self.priority_epsilon;
        let held = self.slots.len();
        if let Some(priorities) = self.priorities.as_mut() {
            for (&slot, &error) in slots.iter().zip(td_errors.iter()) {
                if slot < held && error.is_finite() {
                    let priority = error.abs() + epsilon;
                    priorities[slot] = priority;
                    if priority > self.max_priority {
                        self.max_priority = priority;
                    }
                }
            }
        }
    }
}
