use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, trace};

use crate::agent::dueling;
use crate::agent::traits::{choose_of_kind, first_max, LearningAlgorithm};
use crate::algorithms::actor_critic::{mask_for, ActionMask};
use crate::config::{AlgorithmKind, Hyperparameters};
use crate::error::{PlutusError, Result};
use crate::export::{ModelBlob, ModelMetadata};
use crate::loss::{HuberLoss, Loss};
use crate::network::NeuralNetwork;
use crate::optimizer::{GradientClipper, OptimizerWrapper};
use crate::replay_buffer::{ExperienceStore, SamplingMode};
use crate::types::{Action, ActionKind, Experience, State};

/// Value used to bootstrap a DQN target from the next state's Q-values.
///
/// Standard DQN takes the target network's maximum. Double DQN lets the main
/// network pick the action and reads its value from the target network.
pub fn bootstrap_value(main_next: ArrayView1<f32>, target_next: ArrayView1<f32>, double: bool) -> f32 {
    masked_bootstrap_value(main_next, target_next, &[], double)
}

/// [`bootstrap_value`] restricted to the kinds legal in the next state.
/// An empty or all-false `mask` leaves every kind eligible.
pub fn masked_bootstrap_value(main_next: ArrayView1<f32>, target_next: ArrayView1<f32>, mask: &[bool], double: bool) -> f32 {
    let restricted = mask.iter().any(|&m| m);
    let allowed = |i: usize| !restricted || mask.get(i).copied().unwrap_or(false);
    if double {
        first_max(main_next.iter().enumerate().map(|(i, &v)| if allowed(i) { v } else { f32::NAN }))
            .map(|best| target_next[best])
            .unwrap_or(0.0)
    } else {
        target_next
            .iter()
            .enumerate()
            .filter(|(i, _)| allowed(*i))
            .map(|(_, &v)| v)
            .reduce(f32::max)
            .unwrap_or(0.0)
    }
}

/// Deep Q-network learner with a periodically synced target network.
///
/// Every experience goes into the replay store; once the store holds a full
/// batch, each environment step also trains the main network on one sampled
/// mini-batch. The target network only ever changes by a full copy of the main
/// network every `target_update_frequency` steps.
#[derive(Clone, Debug)]
pub struct DqnLearner {
    main: NeuralNetwork,
    target: NeuralNetwork,
    store: ExperienceStore,
    /// Kinds legal in each stored experience's next state, by ring slot
    next_masks: Vec<ActionMask>,
    params: Hyperparameters,
    loss: HuberLoss,
    epsilon: f32,
    steps: u64,
    train_steps: u64,
    episodes: u64,
}

impl DqnLearner {
    pub fn new(input_dim: usize, params: Hyperparameters, rng: &mut StdRng) -> Result<Self> {
        if params.dqn.target_update_frequency == 0 {
            return Err(PlutusError::invalid_parameter("dqn.target_update_frequency", "must be at least 1"));
        }
        let optimizer = OptimizerWrapper::from_kind(params.network.optimizer_kind()?);
        let outputs = if params.dqn.dueling {
            ActionKind::COUNT + 1
        } else {
            ActionKind::COUNT
        };
        let sizes = params.network.layer_sizes(input_dim, outputs);
        let mut main = NeuralNetwork::with_hidden_activation(&sizes, params.network.activation, optimizer, rng)?;
        if let Some(max_norm) = params.network.max_grad_norm {
            main = main.with_clipper(GradientClipper::ClipByGlobalNorm { max_norm });
        }
        let target = main.clone();

        let mode = if params.dqn.prioritized_replay {
            SamplingMode::Prioritized {
                alpha: params.dqn.priority_alpha,
                beta: params.dqn.priority_beta,
            }
        } else {
            SamplingMode::Uniform
        };
        let store = ExperienceStore::new(params.dqn.replay_capacity, mode)?;

        Ok(DqnLearner {
            main,
            target,
            store,
            next_masks: Vec::new(),
            loss: HuberLoss::new(params.dqn.huber_delta),
            epsilon: params.exploration.initial_rate,
            params,
            steps: 0,
            train_steps: 0,
            episodes: 0,
        })
    }

    fn head(&self, raw: Array1<f32>) -> Array1<f32> {
        if self.params.dqn.dueling {
            dueling::combine(raw.view())
        } else {
            raw
        }
    }

    /// Q-values of the main network, one per action kind
    pub fn q_values(&self, features: ArrayView1<f32>) -> Array1<f32> {
        self.head(self.main.predict(features))
    }

    pub fn target_q_values(&self, features: ArrayView1<f32>) -> Array1<f32> {
        self.head(self.target.predict(features))
    }

    pub fn store(&self) -> &ExperienceStore {
        &self.store
    }

    pub fn train_steps(&self) -> u64 {
        self.train_steps
    }

    /// Hard copy of the main network into the target network
    pub fn sync_target(&mut self) {
        self.target = self.main.clone();
    }

    /// Train on one sampled mini-batch. `Ok(None)` while the store is still
    /// smaller than the batch size.
    pub fn train_batch(&mut self, rng: &mut StdRng) -> Result<Option<f32>> {
        let gamma = self.params.discount;
        let double = self.params.dqn.double_dqn;
        let dueling = self.params.dqn.dueling;
        let learning_rate = self.params.network.learning_rate;

        let Some(batch) = self.store.sample(self.params.dqn.batch_size, rng) else {
            return Ok(None);
        };

        let size = batch.len();
        let input_dim = self.main.input_size();
        let mut states = Array2::zeros((size, input_dim));
        let mut actions = Vec::with_capacity(size);
        let mut targets = Vec::with_capacity(size);

        for (i, experience) in batch.experiences.iter().enumerate() {
            if experience.state.dim() != input_dim || experience.next_state.dim() != input_dim {
                return Err(PlutusError::dimension_mismatch(
                    format!("{} features", input_dim),
                    format!("{} / {} features", experience.state.dim(), experience.next_state.dim()),
                ));
            }
            states.row_mut(i).assign(&experience.state.features());
            actions.push(experience.action.kind.index());

            let bootstrap = if experience.done {
                0.0
            } else {
                let next = experience.next_state.features();
                let target_next = self.target_q_values(next);
                let main_next = if double { self.q_values(next) } else { Array1::zeros(0) };
                let mask = self.next_masks.get(batch.indices[i]).copied().unwrap_or([false; ActionKind::COUNT]);
                masked_bootstrap_value(main_next.view(), target_next.view(), &mask, double)
            };
            targets.push(experience.reward.total() + gamma * bootstrap);
        }
        let slots = batch.indices.clone();
        let weights = batch.weights.clone();
        drop(batch);

        let huber = self.loss;
        let mut td_errors = vec![0.0f32; size];
        let mut weighted_loss = 0.0f32;
        self.main.train_step(states.view(), learning_rate, |raw| {
            let q = if dueling { dueling::combine_batch(raw.view()) } else { raw.clone() };
            let mut grad_q = Array2::zeros(q.dim());
            for i in 0..size {
                let error = q[[i, actions[i]]] - targets[i];
                td_errors[i] = error;
                weighted_loss += weights[i] * huber.value(error);
                grad_q[[i, actions[i]]] = weights[i] * huber.gradient(error) / size as f32;
            }
            if dueling {
                dueling::backward_batch(grad_q.view())
            } else {
                grad_q
            }
        })?;

        self.store.update_priorities(&slots, &td_errors);
        self.train_steps += 1;
        let loss = weighted_loss / size as f32;
        trace!(train_step = self.train_steps, loss, "dqn batch");
        Ok(Some(loss))
    }
}

impl LearningAlgorithm for DqnLearner {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Dqn
    }

    fn select_action(&mut self, state: &State, available: &[Action], rng: &mut StdRng) -> Result<Action> {
        if available.is_empty() {
            return Err(PlutusError::EmptyActionSet { agent: state.owner() });
        }
        if state.dim() != self.main.input_size() {
            return Err(PlutusError::dimension_mismatch(
                format!("{} features", self.main.input_size()),
                format!("{} features", state.dim()),
            ));
        }

        if rng.gen::<f32>() < self.epsilon {
            if let Some(action) = available.choose(rng) {
                return Ok(action.clone());
            }
        }
        let q = self.q_values(state.features());
        let index = first_max(available.iter().map(|a| q[a.kind.index()])).unwrap_or(0);
        let chosen = choose_of_kind(available, available[index].kind, rng).unwrap_or(&available[index]);
        Ok(chosen.clone())
    }

    fn update(&mut self, experience: &Experience, next_available: &[Action], rng: &mut StdRng) -> Result<Option<f32>> {
        let slot = self.store.push(experience.clone());
        let mask = mask_for(next_available);
        if slot < self.next_masks.len() {
            self.next_masks[slot] = mask;
        } else {
            self.next_masks.push(mask);
        }
        self.steps += 1;

        let loss = self.train_batch(rng)?;

        if self.steps % self.params.dqn.target_update_frequency as u64 == 0 {
            self.sync_target();
            debug!(step = self.steps, "target network synced");
        }
        Ok(loss)
    }

    fn complete_episode(&mut self, _rng: &mut StdRng) -> Result<Option<f32>> {
        let exploration = &self.params.exploration;
        self.epsilon = (self.epsilon * exploration.decay).max(exploration.min_rate);
        self.episodes += 1;
        Ok(None)
    }

    fn exploration_rate(&self) -> f32 {
        self.epsilon
    }

    fn set_exploration_rate(&mut self, rate: f32) {
        self.epsilon = rate.clamp(0.0, 1.0);
    }

    fn save(&self) -> ModelBlob {
        ModelBlob::from_networks(
            AlgorithmKind::Dqn,
            &[&self.main],
            self.params.clone(),
            self.epsilon,
            ModelMetadata::new(self.steps, self.episodes),
        )
    }

    /// Restores the main network and syncs the target to it
    fn load(&mut self, blob: &ModelBlob) -> Result<()> {
        blob.expect_algorithm(AlgorithmKind::Dqn)?;
        let networks = blob.network_parameters()?;
        let [params] = networks.as_slice() else {
            return Err(PlutusError::dimension_mismatch("1 network".to_string(), format!("{} networks", networks.len())));
        };
        self.main.load_parameters(params)?;
        self.sync_target();
        self.epsilon = blob.exploration_rate.clamp(0.0, 1.0);
        self.steps = blob.metadata.step_count;
        self.episodes = blob.metadata.episode_count;
        Ok(())
    }
}
