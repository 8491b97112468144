use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, trace};

use crate::agent::traits::{choose_of_kind, LearningAlgorithm};
use crate::algorithms::advantage::{compute_gae, discounted_returns};
use crate::config::{AlgorithmKind, Hyperparameters};
use crate::error::{PlutusError, Result};
use crate::export::{ModelBlob, ModelMetadata};
use crate::network::NeuralNetwork;
use crate::optimizer::{GradientClipper, OptimizerWrapper};
use crate::types::{Action, ActionKind, Experience, State};

/// Floor applied before taking the log of a probability
pub const LOG_PROB_FLOOR: f32 = 1e-8;

/// Which actions the policy may choose, indexed by `ActionKind::index`
pub type ActionMask = [bool; ActionKind::COUNT];

pub fn mask_for(available: &[Action]) -> ActionMask {
    let mut mask = [false; ActionKind::COUNT];
    for action in available {
        mask[action.kind.index()] = true;
    }
    mask
}

/// Softmax over the unmasked logits. Masked entries get probability zero; an
/// all-false mask is treated as all-true.
pub fn masked_softmax(logits: ArrayView1<f32>, mask: &ActionMask) -> Array1<f32> {
    let any = mask.iter().any(|&m| m);
    let allowed = |i: usize| !any || mask.get(i).copied().unwrap_or(false);

    let max_logit = logits
        .iter()
        .enumerate()
        .filter(|(i, _)| allowed(*i))
        .fold(f32::NEG_INFINITY, |m, (_, &l)| m.max(l));
    let mut probs = Array1::zeros(logits.len());
    for (i, &l) in logits.iter().enumerate() {
        if allowed(i) {
            probs[i] = (l - max_logit).exp();
        }
    }
    let total = probs.sum();
    if total > 0.0 && total.is_finite() {
        probs /= total;
    }
    probs
}

/// Shannon entropy of a distribution, skipping zero entries
pub fn entropy(probs: ArrayView1<f32>) -> f32 {
    -probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.max(LOG_PROB_FLOOR).ln())
        .sum::<f32>()
}

/// Gradient of `-log π(a)·A - c·H(π)` with respect to the logits
pub fn policy_gradient(probs: ArrayView1<f32>, mask: &ActionMask, action: usize, advantage: f32, entropy_coef: f32) -> Array1<f32> {
    let any = mask.iter().any(|&m| m);
    let h = entropy(probs);
    let mut grad = Array1::zeros(probs.len());
    for (k, &p) in probs.iter().enumerate() {
        if any && !mask[k] {
            continue;
        }
        let indicator = if k == action { 1.0 } else { 0.0 };
        let log_p = p.max(LOG_PROB_FLOOR).ln();
        grad[k] = -advantage * (indicator - p) + entropy_coef * p * (log_p + h);
    }
    grad
}

/// One stored step of the running episode together with the mask the action
/// was drawn under
#[derive(Clone, Debug)]
struct EpisodeStep {
    experience: Experience,
    mask: ActionMask,
}

/// Advantage actor-critic over the fixed action vocabulary.
///
/// The actor emits one logit per `ActionKind`; the critic a scalar state
/// value. With `online_updates` on, each experience triggers a bootstrapped
/// 1-step update of both networks, and the whole episode is replayed once more
/// at its end with GAE (or REINFORCE) advantages. Turning `online_updates`
/// off leaves only the end-of-episode update.
///
/// The exploration rate of this learner is its entropy coefficient.
#[derive(Clone, Debug)]
pub struct ActorCritic {
    actor: NeuralNetwork,
    critic: NeuralNetwork,
    params: Hyperparameters,
    entropy_coef: f32,
    baseline: Option<f32>,
    pending_mask: Option<ActionMask>,
    episode: Vec<EpisodeStep>,
    steps: u64,
    episodes: u64,
}

impl ActorCritic {
    pub fn new(input_dim: usize, params: Hyperparameters, rng: &mut StdRng) -> Result<Self> {
        let kind = params.network.optimizer_kind()?;
        let activation = params.network.activation;
        let clipper = params
            .network
            .max_grad_norm
            .map_or(GradientClipper::None, |max_norm| GradientClipper::ClipByGlobalNorm { max_norm });

        let actor_sizes = params.network.layer_sizes(input_dim, ActionKind::COUNT);
        let critic_sizes = params.network.layer_sizes(input_dim, 1);
        let actor = NeuralNetwork::with_hidden_activation(&actor_sizes, activation, OptimizerWrapper::from_kind(kind), rng)?
            .with_clipper(clipper);
        let critic = NeuralNetwork::with_hidden_activation(&critic_sizes, activation, OptimizerWrapper::from_kind(kind), rng)?
            .with_clipper(clipper);

        Ok(ActorCritic {
            actor,
            critic,
            entropy_coef: params.actor_critic.entropy_coefficient,
            params,
            baseline: None,
            pending_mask: None,
            episode: Vec::new(),
            steps: 0,
            episodes: 0,
        })
    }

    /// Action probabilities under `mask`, and their entropy
    pub fn policy(&self, features: ArrayView1<f32>, mask: &ActionMask) -> (Array1<f32>, f32) {
        let probs = masked_softmax(self.actor.predict(features).view(), mask);
        let h = entropy(probs.view());
        (probs, h)
    }

    pub fn value(&self, features: ArrayView1<f32>) -> f32 {
        self.critic.predict(features)[0]
    }

    /// Current REINFORCE baseline, `None` before the first episode
    pub fn baseline(&self) -> Option<f32> {
        self.baseline
    }

    pub fn episode_len(&self) -> usize {
        self.episode.len()
    }

    fn check_dim(&self, state: &State) -> Result<()> {
        if state.dim() != self.actor.input_size() {
            return Err(PlutusError::dimension_mismatch(
                format!("{} features", self.actor.input_size()),
                format!("{} features", state.dim()),
            ));
        }
        Ok(())
    }

    /// One gradient step of each network. `advantages[i]` weights the policy
    /// term for sample `i`; `value_targets[i]` is the critic target.
    fn fit(&mut self, steps: &[(&Experience, &ActionMask)], advantages: &[f32], value_targets: &[f32]) -> Result<f32> {
        let size = steps.len();
        let input_dim = self.actor.input_size();
        let mut states = Array2::zeros((size, input_dim));
        for (i, (experience, _)) in steps.iter().enumerate() {
            states.row_mut(i).assign(&experience.state.features());
        }

        let entropy_coef = self.entropy_coef;
        let scale = 1.0 / size as f32;
        let mut policy_loss = 0.0f32;
        self.actor.train_step(states.view(), self.params.network.learning_rate, |logits| {
            let mut grad = Array2::zeros(logits.dim());
            for (i, (experience, mask)) in steps.iter().enumerate() {
                let probs = masked_softmax(logits.row(i), mask);
                let action = experience.action.kind.index();
                policy_loss += -probs[action].max(LOG_PROB_FLOOR).ln() * advantages[i]
                    - entropy_coef * entropy(probs.view());
                let g = policy_gradient(probs.view(), mask, action, advantages[i], entropy_coef);
                grad.row_mut(i).assign(&(g * scale));
            }
            grad
        })?;

        self.critic.train_step(states.view(), self.params.actor_critic.critic_learning_rate, |values| {
            let mut grad = Array2::zeros(values.dim());
            for i in 0..size {
                grad[[i, 0]] = (values[[i, 0]] - value_targets[i]) * scale;
            }
            grad
        })?;

        Ok(policy_loss * scale)
    }

    fn online_update(&mut self, step: &EpisodeStep) -> Result<f32> {
        let experience = &step.experience;
        let gamma = self.params.discount;
        let value = self.value(experience.state.features());
        let next_value = if experience.done {
            0.0
        } else {
            self.value(experience.next_state.features())
        };
        let target = experience.reward.total() + gamma * next_value;
        let td_error = target - value;
        self.fit(&[(experience, &step.mask)], &[td_error], &[target])?;
        Ok(td_error.abs())
    }

    /// Advantage-annotated copies of the episode's experiences
    fn annotate_episode(&mut self) -> Vec<Experience> {
        let gamma = self.params.discount;
        let rewards: Vec<f32> = self.episode.iter().map(|s| s.experience.reward.total()).collect();
        let dones: Vec<bool> = self.episode.iter().map(|s| s.experience.done).collect();

        let (advantages, returns) = if self.params.actor_critic.use_gae {
            let values: Vec<f32> = self.episode.iter().map(|s| self.value(s.experience.state.features())).collect();
            let next_values: Vec<f32> = self
                .episode
                .iter()
                .map(|s| self.value(s.experience.next_state.features()))
                .collect();
            compute_gae(&rewards, &values, &next_values, &dones, gamma, self.params.actor_critic.gae_lambda)
        } else {
            let returns = discounted_returns(&rewards, &dones, gamma);
            let mean_return = returns.iter().sum::<f32>() / returns.len() as f32;
            let baseline = self.baseline.unwrap_or(mean_return);
            let advantages = returns.iter().map(|g| g - baseline).collect();
            let decay = self.params.actor_critic.baseline_decay;
            self.baseline = Some(decay * baseline + (1.0 - decay) * mean_return);
            (advantages, returns)
        };

        self.episode
            .iter()
            .zip(advantages.iter().zip(returns.iter()))
            .map(|(step, (&a, &g))| step.experience.annotated(a, g))
            .collect()
    }
}

impl LearningAlgorithm for ActorCritic {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::ActorCritic
    }

    fn select_action(&mut self, state: &State, available: &[Action], rng: &mut StdRng) -> Result<Action> {
        if available.is_empty() {
            return Err(PlutusError::EmptyActionSet { agent: state.owner() });
        }
        self.check_dim(state)?;

        let mask = mask_for(available);
        let (probs, _) = self.policy(state.features(), &mask);
        self.pending_mask = Some(mask);

        let draw: f32 = rng.gen();
        let mut cumulative = 0.0;
        for (k, &p) in probs.iter().enumerate() {
            cumulative += p;
            if p > 0.0 && draw < cumulative {
                if let Some(action) = choose_of_kind(available, ActionKind::ALL[k], rng) {
                    return Ok(action.clone().with_confidence(p));
                }
            }
        }
        trace!(draw, cumulative, "policy draw overran the distribution");
        Ok(Action::fallback())
    }

    fn update(&mut self, experience: &Experience, _next_available: &[Action], _rng: &mut StdRng) -> Result<Option<f32>> {
        self.check_dim(&experience.state)?;
        let mut mask = self.pending_mask.take().unwrap_or([true; ActionKind::COUNT]);
        // the executed action may be a coordination substitute outside the drawn set
        mask[experience.action.kind.index()] = true;
        let step = EpisodeStep {
            experience: experience.clone(),
            mask,
        };
        self.steps += 1;

        let loss = if self.params.actor_critic.online_updates {
            Some(self.online_update(&step)?)
        } else {
            None
        };
        self.episode.push(step);
        Ok(loss)
    }

    fn complete_episode(&mut self, _rng: &mut StdRng) -> Result<Option<f32>> {
        self.episodes += 1;
        if self.episode.is_empty() {
            return Ok(None);
        }

        let annotated = self.annotate_episode();
        let steps = std::mem::take(&mut self.episode);
        let batch: Vec<(&Experience, &ActionMask)> = annotated
            .iter()
            .zip(steps.iter())
            .map(|(experience, step)| (experience, &step.mask))
            .collect();
        let advantages: Vec<f32> = annotated.iter().map(|e| e.annotations.map_or(0.0, |a| a.advantage)).collect();
        let targets: Vec<f32> = annotated.iter().map(|e| e.annotations.map_or(0.0, |a| a.return_estimate)).collect();

        let loss = self.fit(&batch, &advantages, &targets)?;
        debug!(episode = self.episodes, steps = batch.len(), policy_loss = loss, "actor-critic episode update");
        Ok(Some(loss))
    }

    fn exploration_rate(&self) -> f32 {
        self.entropy_coef
    }

    fn set_exploration_rate(&mut self, rate: f32) {
        self.entropy_coef = rate.clamp(0.0, 1.0);
    }

    /// Actor layers first, then critic layers
    fn save(&self) -> ModelBlob {
        ModelBlob::from_networks(
            AlgorithmKind::ActorCritic,
            &[&self.actor, &self.critic],
            self.params.clone(),
            self.entropy_coef,
            ModelMetadata::new(self.steps, self.episodes),
        )
    }

    fn load(&mut self, blob: &ModelBlob) -> Result<()> {
        blob.expect_algorithm(AlgorithmKind::ActorCritic)?;
        let networks = blob.network_parameters()?;
        let [actor, critic] = networks.as_slice() else {
            return Err(PlutusError::dimension_mismatch("2 networks".to_string(), format!("{} networks", networks.len())));
        };
        self.actor.load_parameters(actor)?;
        self.critic.load_parameters(critic)?;
        self.entropy_coef = blob.exploration_rate.clamp(0.0, 1.0);
        self.episode.clear();
        self.pending_mask = None;
        self.steps = blob.metadata.step_count;
        self.episodes = blob.metadata.episode_count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reward;
    use ndarray::array;
    use rand::SeedableRng;

    fn params(online: bool, gae: bool) -> Hyperparameters {
        let mut params = Hyperparameters::default();
        params.network.hidden_layers = vec![8];
        params.network.learning_rate = 0.01;
        params.actor_critic.online_updates = online;
        params.actor_critic.use_gae = gae;
        params
    }

    fn state(x: f32) -> State {
        State::new(array![x, 0.5], 0, 0)
    }

    #[test]
    fn test_masked_softmax_zeroes_unavailable() {
        let mut mask = [false; ActionKind::COUNT];
        mask[1] = true;
        mask[4] = true;
        let probs = masked_softmax(array![5.0, 1.0, 9.0, 0.0, 1.0, 2.0, 3.0].view(), &mask);
        assert_eq!(probs[0], 0.0);
        assert_eq!(probs[2], 0.0);
        assert!((probs[1] - 0.5).abs() < 1e-6);
        assert!((probs.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_policy_gradient_matches_finite_differences() {
        let mask = [true; ActionKind::COUNT];
        let logits = array![0.1, -0.3, 0.8, 0.0, 0.2, -1.0, 0.5];
        let (action, advantage, coef) = (2, 1.5, 0.1);
        let loss = |z: &Array1<f32>| {
            let p = masked_softmax(z.view(), &mask);
            -p[action].ln() * advantage - coef * entropy(p.view())
        };
        let analytic = policy_gradient(masked_softmax(logits.view(), &mask).view(), &mask, action, advantage, coef);

        let eps = 1e-2;
        for k in 0..ActionKind::COUNT {
            let mut plus = logits.clone();
            plus[k] += eps;
            let mut minus = logits.clone();
            minus[k] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!((numeric - analytic[k]).abs() < 1e-3, "logit {}", k);
        }
    }

    #[test]
    fn test_sampling_only_returns_available_kinds() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut ac = ActorCritic::new(2, params(true, true), &mut rng).unwrap();
        let available = [Action::new(ActionKind::Trade), Action::targeting(ActionKind::BuyProperty, 3)];
        for _ in 0..50 {
            let action = ac.select_action(&state(0.2), &available, &mut rng).unwrap();
            assert!(matches!(action.kind, ActionKind::Trade | ActionKind::BuyProperty));
            assert!(action.confidence > 0.0);
        }
    }

    #[test]
    fn test_draw_reaches_every_target_of_a_kind() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut ac = ActorCritic::new(2, params(true, true), &mut rng).unwrap();
        let available = [
            Action::targeting(ActionKind::BuyProperty, 3),
            Action::targeting(ActionKind::BuyProperty, 5),
        ];
        let mut fives = 0;
        for _ in 0..1000 {
            let action = ac.select_action(&state(0.2), &available, &mut rng).unwrap();
            assert_eq!(action.kind, ActionKind::BuyProperty);
            if action.target() == Some(5) {
                fives += 1;
            }
        }
        assert!(fives > 400 && fives < 600, "target 5 drawn {} times", fives);
    }

    #[test]
    fn test_substituted_action_joins_the_mask() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut ac = ActorCritic::new(2, params(false, true), &mut rng).unwrap();
        let available = [Action::new(ActionKind::Invest), Action::targeting(ActionKind::BuyProperty, 3)];
        ac.select_action(&state(0.2), &available, &mut rng).unwrap();

        let executed = Action::substitute_for(&available[1], "resource 3 granted to agent 1");
        let experience = Experience::new(state(0.2), executed, Reward::scalar(1.0), state(0.3), false);
        ac.update(&experience, &[], &mut rng).unwrap();

        let mask = ac.episode[0].mask;
        assert!(mask[ActionKind::Pass.index()]);
        assert!(mask[ActionKind::Invest.index()]);
        assert!(!mask[ActionKind::Trade.index()]);
        let (probs, _) = ac.policy(state(0.2).features(), &mask);
        assert!(probs[ActionKind::Pass.index()] > 0.0);

        let loss = ac.complete_episode(&mut rng).unwrap().unwrap();
        assert!(loss.is_finite());
    }

    #[test]
    fn test_online_updates_toggle() {
        let mut rng = StdRng::seed_from_u64(6);
        let experience = Experience::new(state(0.1), Action::pass(), Reward::scalar(1.0), state(0.2), false);

        let mut online = ActorCritic::new(2, params(true, true), &mut rng).unwrap();
        assert!(online.update(&experience, &[], &mut rng).unwrap().is_some());

        let mut batch_only = ActorCritic::new(2, params(false, true), &mut rng).unwrap();
        let before = batch_only.value(state(0.1).features());
        assert!(batch_only.update(&experience, &[], &mut rng).unwrap().is_none());
        assert_eq!(batch_only.value(state(0.1).features()), before);
        assert_eq!(batch_only.episode_len(), 1);

        assert!(batch_only.complete_episode(&mut rng).unwrap().is_some());
        assert_eq!(batch_only.episode_len(), 0);
        assert_ne!(batch_only.value(state(0.1).features()), before);
    }

    #[test]
    fn test_critic_moves_towards_returns() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ac = ActorCritic::new(2, params(false, false), &mut rng).unwrap();
        let start = state(0.3);
        let before = ac.value(start.features());
        for _ in 0..100 {
            let experience = Experience::new(start.clone(), Action::pass(), Reward::scalar(2.0), state(0.9), true);
            ac.update(&experience, &[], &mut rng).unwrap();
            ac.complete_episode(&mut rng).unwrap();
        }
        let after = ac.value(start.features());
        assert!((after - 2.0).abs() < (before - 2.0).abs());
        assert!((ac.baseline().unwrap() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_save_load_reproduces_outputs() {
        let mut rng = StdRng::seed_from_u64(10);
        let ac = ActorCritic::new(2, params(true, true), &mut rng).unwrap();
        let blob = ModelBlob::from_json(&ac.save().to_json().unwrap()).unwrap();
        assert_eq!(blob.layer_counts, vec![2, 2]);

        let mut restored = ActorCritic::new(2, params(true, true), &mut rng).unwrap();
        restored.load(&blob).unwrap();
        let mask = [true; ActionKind::COUNT];
        let probe = state(0.4);
        assert_eq!(restored.policy(probe.features(), &mask).0, ac.policy(probe.features(), &mask).0);
        assert_eq!(restored.value(probe.features()), ac.value(probe.features()));
    }
}
