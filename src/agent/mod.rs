//! # Agents
//!
//! An [`Agent`] is one player seat: an id, a behavioural [`AgentType`], a
//! private random generator, and exactly one learner behind the
//! [`LearningAlgorithm`] trait. The learner is chosen from the configured
//! algorithm tag when the agent is built; unknown tags and optimizers fail
//! there, before any training starts.
//!
//! Agents never look at each other's learners or replay stores. What they
//! learn about peers arrives as [`Message`]s and is kept in
//! [`PeerKnowledge`].
//!
//! ## Example
//!
//! ```
//! use plutus::agent::Agent;
//! use plutus::config::AgentConfig;
//! use plutus::types::{Action, ActionKind, State};
//! use ndarray::array;
//!
//! let mut agent = Agent::new(AgentConfig::new(0, "q_learning"), 2, 7).unwrap();
//! let state = State::new(array![0.0, 1.0], 0, 0);
//! let choice = agent
//!     .select_action(&state, &[Action::pass(), Action::new(ActionKind::Invest)])
//!     .unwrap();
//! assert!(matches!(choice.kind, ActionKind::Pass | ActionKind::Invest));
//!
//! assert!(Agent::new(AgentConfig::new(1, "sarsa"), 2, 7).is_err());
//! ```

pub mod dqn;
pub mod dueling;
pub mod traits;

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::algorithms::{ActorCritic, TabularQLearning};
use crate::config::{AgentConfig, AlgorithmKind, Hyperparameters};
use crate::error::Result;
use crate::export::ModelBlob;
use crate::metrics::{AgentStatistics, StrategySummary};
use crate::multi_agent::communication::{Message, MessageBody};
use crate::types::{Action, ActionKind, AgentId, Experience, ResourceId, State};

pub use dqn::DqnLearner;
pub use traits::LearningAlgorithm;

/// Behavioural disposition of an agent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    #[default]
    Independent,
    /// Shares strategy summaries with other cooperative agents
    Cooperative,
    Competitive,
    Mixed,
}

/// Build the learner for `kind`. This is the only place an algorithm tag is
/// branched on.
pub fn build_algorithm(
    kind: AlgorithmKind,
    input_dim: usize,
    params: &Hyperparameters,
    rng: &mut StdRng,
) -> Result<Box<dyn LearningAlgorithm>> {
    params.validate()?;
    Ok(match kind {
        AlgorithmKind::Tabular => Box::new(TabularQLearning::new(params.clone())),
        AlgorithmKind::Dqn => Box::new(DqnLearner::new(input_dim, params.clone(), rng)?),
        AlgorithmKind::ActorCritic => Box::new(ActorCritic::new(input_dim, params.clone(), rng)?),
    })
}

/// Per-agent seed derived from the run's master seed
pub fn derive_seed(master: u64, agent: AgentId) -> u64 {
    master ^ (agent as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// What an agent has heard from its peers
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeerKnowledge {
    /// Latest strategy summary per cooperative peer
    pub strategies: BTreeMap<AgentId, StrategySummary>,
    /// Latest announced intention per neighbour
    pub intentions: BTreeMap<AgentId, (ActionKind, Option<ResourceId>)>,
    /// Most recent leader directive: `(leader, suggested action)`
    pub directive: Option<(AgentId, ActionKind)>,
    /// Contested resources that went to someone else
    pub conflicts_lost: usize,
}

pub struct Agent {
    id: AgentId,
    agent_type: AgentType,
    algorithm: AlgorithmKind,
    learner: Box<dyn LearningAlgorithm>,
    rng: StdRng,
    stats: AgentStatistics,
    peers: PeerKnowledge,
}

impl Agent {
    /// Build an agent whose inputs have `input_dim` features. `seed` seeds the
    /// agent's private generator.
    pub fn new(config: AgentConfig, input_dim: usize, seed: u64) -> Result<Self> {
        let algorithm = config.algorithm_kind()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let learner = build_algorithm(algorithm, input_dim, &config.hyperparameters, &mut rng)?;
        info!(agent = config.id, %algorithm, agent_type = ?config.agent_type, "agent created");

        Ok(Agent {
            id: config.id,
            agent_type: config.agent_type,
            algorithm,
            learner,
            rng,
            stats: AgentStatistics::default(),
            peers: PeerKnowledge::default(),
        })
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    pub fn algorithm(&self) -> AlgorithmKind {
        self.algorithm
    }

    pub fn is_cooperative(&self) -> bool {
        self.agent_type == AgentType::Cooperative
    }

    pub fn learner(&self) -> &dyn LearningAlgorithm {
        self.learner.as_ref()
    }

    pub fn statistics(&self) -> &AgentStatistics {
        &self.stats
    }

    pub fn statistics_mut(&mut self) -> &mut AgentStatistics {
        &mut self.stats
    }

    pub fn peers(&self) -> &PeerKnowledge {
        &self.peers
    }

    /// Pick an action. With nothing available the agent passes with low
    /// confidence instead of failing.
    pub fn select_action(&mut self, state: &State, available: &[Action]) -> Result<Action> {
        if available.is_empty() {
            debug!(agent = self.id, "no available actions, passing");
            return Ok(Action::fallback());
        }
        self.learner.select_action(state, available, &mut self.rng)
    }

    /// Record and learn from one transition
    pub fn update_experience(&mut self, experience: &Experience, next_available: &[Action]) -> Result<Option<f32>> {
        self.stats.record_step(experience.action.kind, experience.reward.total());
        let loss = self.learner.update(experience, next_available, &mut self.rng)?;
        if let Some(loss) = loss {
            self.stats.record_loss(loss);
        }
        Ok(loss)
    }

    /// Finish the running episode and return its total reward
    pub fn complete_episode(&mut self) -> Result<f32> {
        if let Some(loss) = self.learner.complete_episode(&mut self.rng)? {
            self.stats.record_loss(loss);
        }
        Ok(self.stats.end_episode())
    }

    pub fn exploration_rate(&self) -> f32 {
        self.learner.exploration_rate()
    }

    pub fn set_exploration_rate(&mut self, rate: f32) {
        self.learner.set_exploration_rate(rate);
    }

    pub fn strategy_summary(&self, window: usize) -> Option<StrategySummary> {
        self.stats.strategy_summary(window)
    }

    pub fn save_model(&self) -> ModelBlob {
        self.learner.save()
    }

    pub fn load_model(&mut self, blob: &ModelBlob) -> Result<()> {
        self.learner.load(blob)
    }

    /// Fold drained messages into this agent's peer knowledge. Messages from
    /// itself are ignored.
    pub fn process_messages(&mut self, messages: Vec<Message>) -> usize {
        let mut processed = 0;
        for message in messages {
            if message.sender == self.id {
                continue;
            }
            match message.body {
                MessageBody::StrategyShare {
                    best_action,
                    average_reward,
                    episodes,
                } => {
                    self.peers.strategies.insert(
                        message.sender,
                        StrategySummary {
                            best_action,
                            average_reward,
                            episodes,
                        },
                    );
                }
                MessageBody::Information { intended, target } => {
                    self.peers.intentions.insert(message.sender, (intended, target));
                }
                MessageBody::Directive { leader, suggested, .. } => {
                    self.peers.directive = Some((leader, suggested));
                }
                MessageBody::ConflictNotice { .. } => {
                    self.peers.conflicts_lost += 1;
                }
            }
            processed += 1;
        }
        processed
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("agent_type", &self.agent_type)
            .field("algorithm", &self.algorithm)
            .field("exploration_rate", &self.exploration_rate())
            .field("episodes", &self.stats.episode_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlutusError;
    use crate::multi_agent::communication::Message;
    use ndarray::array;

    #[test]
    fn test_unknown_tags_fail_at_construction() {
        assert!(matches!(
            Agent::new(AgentConfig::new(0, "ppo"), 4, 1),
            Err(PlutusError::UnknownAlgorithm(_))
        ));

        let mut config = AgentConfig::new(0, "dqn");
        config.hyperparameters.network.optimizer = "rmsprop".to_string();
        assert!(matches!(Agent::new(config, 4, 1), Err(PlutusError::UnknownOptimizer(_))));
    }

    #[test]
    fn test_every_algorithm_builds() {
        for tag in ["tabular", "dqn", "actor_critic"] {
            let agent = Agent::new(AgentConfig::new(3, tag), 4, 1).unwrap();
            assert_eq!(agent.algorithm().to_string(), tag);
            assert_eq!(agent.learner().kind(), agent.algorithm());
        }
    }

    #[test]
    fn test_empty_action_set_passes() {
        let mut agent = Agent::new(AgentConfig::new(0, "tabular"), 2, 1).unwrap();
        let action = agent.select_action(&State::new(array![0.0, 0.0], 0, 0), &[]).unwrap();
        assert_eq!(action.kind, ActionKind::Pass);
        assert!(action.confidence < 0.5);
    }

    #[test]
    fn test_process_messages_updates_peer_knowledge() {
        let mut agent = Agent::new(AgentConfig::new(1, "tabular"), 2, 1).unwrap();
        let messages = vec![
            Message::to(
                0,
                1,
                MessageBody::StrategyShare {
                    best_action: ActionKind::Invest,
                    average_reward: 4.0,
                    episodes: 10,
                },
                5,
            ),
            Message::to(
                2,
                1,
                MessageBody::Directive {
                    leader: 2,
                    leader_action: ActionKind::BuyProperty,
                    suggested: ActionKind::Invest,
                },
                6,
            ),
            Message::to(1, 1, MessageBody::ConflictNotice { resource: 3, granted_to: 0 }, 7),
        ];
        assert_eq!(agent.process_messages(messages), 2);
        assert_eq!(agent.peers().strategies[&0].best_action, ActionKind::Invest);
        assert_eq!(agent.peers().directive, Some((2, ActionKind::Invest)));
        assert_eq!(agent.peers().conflicts_lost, 0);
    }

    #[test]
    fn test_derived_seeds_differ_per_agent() {
        assert_ne!(derive_seed(42, 0), derive_seed(42, 1));
        assert_eq!(derive_seed(42, 3), derive_seed(42, 3));
    }
}
