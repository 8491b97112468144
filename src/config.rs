//! Serde-backed configuration for agents and training runs.
//!
//! Every struct has defaults and `#[serde(default)]`, so a JSON document only
//! needs to name the values it changes:
//!
//! ```
//! use plutus::config::AgentConfig;
//!
//! let config = AgentConfig::from_json(r#"{ "id": 2, "algorithm": "dqn" }"#).unwrap();
//! assert_eq!(config.id, 2);
//! assert!(config.hyperparameters.dqn.double_dqn);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::agent::AgentType;
use crate::encoder::EncoderConfig;
use crate::error::{PlutusError, Result};
use crate::multi_agent::{CoordinationProtocol, RewardConfig};
use crate::optimizer::OptimizerKind;
use crate::types::AgentId;

/// Learning algorithm families
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    Tabular,
    Dqn,
    ActorCritic,
}

impl FromStr for AlgorithmKind {
    type Err = PlutusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tabular" | "q_learning" | "qlearning" => Ok(AlgorithmKind::Tabular),
            "dqn" => Ok(AlgorithmKind::Dqn),
            "actor_critic" | "a2c" => Ok(AlgorithmKind::ActorCritic),
            other => Err(PlutusError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::Tabular => write!(f, "tabular"),
            AlgorithmKind::Dqn => write!(f, "dqn"),
            AlgorithmKind::ActorCritic => write!(f, "actor_critic"),
        }
    }
}

/// Epsilon-greedy schedule of the value-based learners
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    pub initial_rate: f32,
    /// Multiplied into the rate after every completed episode
    pub decay: f32,
    pub min_rate: f32,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        ExplorationConfig {
            initial_rate: 1.0,
            decay: 0.995,
            min_rate: 0.01,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabularConfig {
    pub learning_rate: f32,
    /// Value assumed for every state-action pair on first reference
    pub initial_value: f32,
    pub eligibility_traces: bool,
    pub trace_lambda: f32,
    /// Traces that decay below this are dropped
    pub trace_threshold: f32,
}

impl Default for TabularConfig {
    fn default() -> Self {
        TabularConfig {
            learning_rate: 0.1,
            initial_value: 0.0,
            eligibility_traces: false,
            trace_lambda: 0.9,
            trace_threshold: 0.01,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    /// Optimizer tag, parsed when the agent is built
    pub optimizer: String,
    pub learning_rate: f32,
    /// Global gradient-norm ceiling, no clipping when absent
    pub max_grad_norm: Option<f32>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            hidden_layers: vec![64, 64],
            activation: Activation::Relu,
            optimizer: "adam".to_string(),
            learning_rate: 1e-3,
            max_grad_norm: None,
        }
    }
}

impl NetworkConfig {
    pub fn optimizer_kind(&self) -> Result<OptimizerKind> {
        self.optimizer.parse()
    }

    /// Full layer size list `[input, hidden.., output]`
    pub fn layer_sizes(&self, input: usize, output: usize) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_layers.len() + 2);
        sizes.push(input);
        sizes.extend_from_slice(&self.hidden_layers);
        sizes.push(output);
        sizes
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    pub replay_capacity: usize,
    pub batch_size: usize,
    /// Environment steps between hard copies of the main network into the target
    pub target_update_frequency: usize,
    pub double_dqn: bool,
    pub dueling: bool,
    pub prioritized_replay: bool,
    pub priority_alpha: f32,
    pub priority_beta: f32,
    pub huber_delta: f32,
}

impl Default for DqnConfig {
    fn default() -> Self {
        DqnConfig {
            replay_capacity: 10_000,
            batch_size: 32,
            target_update_frequency: 100,
            double_dqn: true,
            dueling: false,
            prioritized_replay: false,
            priority_alpha: 0.6,
            priority_beta: 0.4,
            huber_delta: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorCriticConfig {
    /// GAE when true, Monte-Carlo REINFORCE with a moving baseline otherwise
    pub use_gae: bool,
    pub gae_lambda: f32,
    pub critic_learning_rate: f32,
    /// Smoothing of the REINFORCE baseline
    pub baseline_decay: f32,
    /// Weight of the entropy bonus; reported as the learner's exploration rate
    pub entropy_coefficient: f32,
    /// Apply a bootstrapped 1-step update after every experience in addition
    /// to the end-of-episode batch update
    pub online_updates: bool,
}

impl Default for ActorCriticConfig {
    fn default() -> Self {
        ActorCriticConfig {
            use_gae: true,
            gae_lambda: 0.95,
            critic_learning_rate: 1e-3,
            baseline_decay: 0.9,
            entropy_coefficient: 0.01,
            online_updates: true,
        }
    }
}

/// All learner settings for one agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub discount: f32,
    pub exploration: ExplorationConfig,
    pub tabular: TabularConfig,
    pub network: NetworkConfig,
    pub dqn: DqnConfig,
    pub actor_critic: ActorCriticConfig,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            discount: 0.95,
            exploration: ExplorationConfig::default(),
            tabular: TabularConfig::default(),
            network: NetworkConfig::default(),
            dqn: DqnConfig::default(),
            actor_critic: ActorCriticConfig::default(),
        }
    }
}

impl Hyperparameters {
    /// Reject values no learner can work with
    pub fn validate(&self) -> Result<()> {
        self.network.optimizer_kind()?;
        check_unit("discount", self.discount)?;
        check_unit("exploration.initial_rate", self.exploration.initial_rate)?;
        check_unit("exploration.decay", self.exploration.decay)?;
        check_unit("exploration.min_rate", self.exploration.min_rate)?;
        check_unit("tabular.trace_lambda", self.tabular.trace_lambda)?;
        check_unit("actor_critic.gae_lambda", self.actor_critic.gae_lambda)?;
        check_unit("actor_critic.baseline_decay", self.actor_critic.baseline_decay)?;
        check_unit("actor_critic.entropy_coefficient", self.actor_critic.entropy_coefficient)?;
        if !(self.tabular.learning_rate > 0.0 && self.tabular.learning_rate <= 1.0) {
            return Err(PlutusError::invalid_parameter(
                "tabular.learning_rate".to_string(),
                format!("{} is outside (0, 1]", self.tabular.learning_rate),
            ));
        }
        if self.network.learning_rate <= 0.0 || self.actor_critic.critic_learning_rate <= 0.0 {
            return Err(PlutusError::invalid_parameter("network.learning_rate", "must be positive"));
        }
        if self.dqn.batch_size == 0 || self.dqn.replay_capacity < self.dqn.batch_size {
            return Err(PlutusError::invalid_parameter(
                "dqn.batch_size".to_string(),
                format!(
                    "batch size {} must be at least 1 and fit in capacity {}",
                    self.dqn.batch_size, self.dqn.replay_capacity
                ),
            ));
        }
        if self.dqn.target_update_frequency == 0 {
            return Err(PlutusError::invalid_parameter("dqn.target_update_frequency", "must be at least 1"));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PlutusError::invalid_parameter(name.to_string(), format!("{} is outside [0, 1]", value)))
    }
}

/// Construction parameters for one agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub id: AgentId,
    pub agent_type: AgentType,
    /// Algorithm tag (`tabular`, `q_learning`, `dqn`, `actor_critic`, `a2c`)
    pub algorithm: String,
    pub hyperparameters: Hyperparameters,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            id: 0,
            agent_type: AgentType::Independent,
            algorithm: "tabular".to_string(),
            hyperparameters: Hyperparameters::default(),
        }
    }
}

impl AgentConfig {
    pub fn new(id: AgentId, algorithm: impl Into<String>) -> Self {
        AgentConfig {
            id,
            algorithm: algorithm.into(),
            ..Self::default()
        }
    }

    pub fn algorithm_kind(&self) -> Result<AlgorithmKind> {
        self.algorithm.parse()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Settings of one training run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Master seed; each agent derives its own generator from it
    pub seed: u64,
    pub max_steps_per_episode: usize,
    /// Episodes between cooperative strategy exchanges (0 disables)
    pub strategy_share_interval: usize,
    /// Episodes between exploration nudges (0 disables)
    pub exploration_adapt_interval: usize,
    pub adaptation_factor: f32,
    pub exploration_min: f32,
    pub exploration_max: f32,
    /// Episodes averaged when judging improvement
    pub moving_average_window: usize,
    pub coordination: CoordinationProtocol,
    /// Board distance within which agents count as neighbours
    pub neighbor_distance: usize,
    pub encoder: EncoderConfig,
    pub reward: RewardConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            seed: 42,
            max_steps_per_episode: 200,
            strategy_share_interval: 10,
            exploration_adapt_interval: 50,
            adaptation_factor: 1.1,
            exploration_min: 0.01,
            exploration_max: 1.0,
            moving_average_window: 20,
            coordination: CoordinationProtocol::None,
            neighbor_distance: 6,
            encoder: EncoderConfig::default(),
            reward: RewardConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps_per_episode == 0 {
            return Err(PlutusError::invalid_parameter("max_steps_per_episode", "must be at least 1"));
        }
        if self.adaptation_factor < 1.0 {
            return Err(PlutusError::invalid_parameter("adaptation_factor", "must be at least 1.0"));
        }
        if self.exploration_min > self.exploration_max {
            return Err(PlutusError::invalid_parameter(
                "exploration_min".to_string(),
                format!("{} exceeds exploration_max {}", self.exploration_min, self.exploration_max),
            ));
        }
        if self.moving_average_window == 0 {
            return Err(PlutusError::invalid_parameter("moving_average_window", "must be at least 1"));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: TrainingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_tags() {
        assert_eq!("q_learning".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Tabular);
        assert_eq!("A2C".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::ActorCritic);
        assert_eq!("dqn".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Dqn);
        assert!(matches!(
            "ppo".parse::<AlgorithmKind>(),
            Err(PlutusError::UnknownAlgorithm(tag)) if tag == "ppo"
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AgentConfig::from_json(
            r#"{ "id": 1, "algorithm": "tabular", "hyperparameters": { "tabular": { "learning_rate": 0.5 } } }"#,
        )
        .unwrap();
        assert_eq!(config.hyperparameters.tabular.learning_rate, 0.5);
        assert_eq!(config.hyperparameters.tabular.initial_value, 0.0);
        assert_eq!(config.hyperparameters.discount, 0.95);
        assert_eq!(config.agent_type, AgentType::Independent);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut params = Hyperparameters::default();
        assert!(params.validate().is_ok());
        params.discount = 1.5;
        assert!(params.validate().is_err());

        let mut params = Hyperparameters::default();
        params.dqn.batch_size = params.dqn.replay_capacity + 1;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_training_config_round_trip() {
        let config = TrainingConfig {
            coordination: CoordinationProtocol::Hierarchical,
            ..TrainingConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(TrainingConfig::from_json(&json).unwrap(), config);
    }
}
