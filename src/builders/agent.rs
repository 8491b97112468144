use crate::activations::Activation;
use crate::agent::{Agent, AgentType};
use crate::config::{AgentConfig, ExplorationConfig, Hyperparameters};
use crate::error::{PlutusError, Result};
use crate::types::AgentId;

/// Builder for [`Agent`] with a fluent API
pub struct AgentBuilder {
    id: AgentId,
    agent_type: AgentType,
    algorithm: Option<String>,
    hyperparameters: Hyperparameters,
    input_dim: Option<usize>,
    seed: u64,
}

impl AgentBuilder {
    pub fn new(id: AgentId) -> Self {
        AgentBuilder {
            id,
            agent_type: AgentType::default(),
            algorithm: None,
            hyperparameters: Hyperparameters::default(),
            input_dim: None,
            seed: 0,
        }
    }

    /// Start from a complete configuration
    pub fn from_config(config: AgentConfig) -> Self {
        AgentBuilder {
            id: config.id,
            agent_type: config.agent_type,
            algorithm: Some(config.algorithm),
            hyperparameters: config.hyperparameters,
            input_dim: None,
            seed: 0,
        }
    }

    /// Algorithm tag, parsed when the agent is built
    pub fn algorithm(mut self, tag: impl Into<String>) -> Self {
        self.algorithm = Some(tag.into());
        self
    }

    pub fn agent_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = agent_type;
        self
    }

    pub fn input_dim(mut self, input_dim: usize) -> Self {
        self.input_dim = Some(input_dim);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub fn discount(mut self, discount: f32) -> Self {
        self.hyperparameters.discount = discount;
        self
    }

    pub fn exploration(mut self, exploration: ExplorationConfig) -> Self {
        self.hyperparameters.exploration = exploration;
        self
    }

    /// Learning rate of whichever learner is built: the table step size, or
    /// the network learning rate
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.hyperparameters.tabular.learning_rate = learning_rate;
        self.hyperparameters.network.learning_rate = learning_rate;
        self
    }

    pub fn hidden_layers(mut self, sizes: &[usize], activation: Activation) -> Self {
        self.hyperparameters.network.hidden_layers = sizes.to_vec();
        self.hyperparameters.network.activation = activation;
        self
    }

    /// Set the optimizer tag (`"sgd"` or `"adam"`)
    pub fn optimizer(mut self, tag: impl Into<String>) -> Self {
        self.hyperparameters.network.optimizer = tag.into();
        self
    }

    pub fn eligibility_traces(mut self, lambda: f32) -> Self {
        self.hyperparameters.tabular.eligibility_traces = true;
        self.hyperparameters.tabular.trace_lambda = lambda;
        self
    }

    pub fn config(&self) -> Result<AgentConfig> {
        let algorithm = self.algorithm.clone().ok_or_else(|| {
            PlutusError::invalid_parameter("algorithm", "algorithm not specified")
        })?;
        Ok(AgentConfig {
            id: self.id,
            agent_type: self.agent_type,
            algorithm,
            hyperparameters: self.hyperparameters.clone(),
        })
    }

    pub fn build(self) -> Result<Agent> {
        let input_dim = self.input_dim.ok_or_else(|| {
            PlutusError::invalid_parameter("input_dim", "input dimension not specified")
        })?;
        if input_dim == 0 {
            return Err(PlutusError::invalid_parameter("input_dim", "must be greater than 0"));
        }
        Agent::new(self.config()?, input_dim, self.seed)
    }
}
