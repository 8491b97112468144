//! # Plutus - Multi-Agent Reinforcement Learning for Economic Board Games
//!
//! Plutus is the training core behind agents that play a turn-based property
//! trading game. It provides interchangeable learners, coordination between
//! simultaneously acting agents, and an orchestrator that drives episodes
//! against an external game engine.
//!
//! ## Key Features
//!
//! - **Tabular Q-learning** with optional TD(λ) eligibility traces
//! - **Deep Q-networks** with target network, double and dueling variants and
//!   prioritized replay
//! - **Actor-critic** with REINFORCE or generalized advantage estimation
//! - **Coordination**: none, centralized, distributed and hierarchical protocols
//! - **Reproducibility**: every random draw goes through an injected `StdRng`
//! - **Exact persistence**: model blobs round-trip through JSON bit for bit
//!
//! ## Quick Start
//!
//! ```rust
//! use plutus::builders::AgentBuilder;
//! use plutus::types::{Action, ActionKind, Experience, Reward, State};
//! use ndarray::array;
//!
//! let mut agent = AgentBuilder::new(0)
//!     .algorithm("tabular")
//!     .learning_rate(0.5)
//!     .input_dim(1)
//!     .seed(7)
//!     .build()
//!     .unwrap();
//!
//! let state = State::new(array![1.0], 0, 0);
//! let actions = [Action::pass(), Action::new(ActionKind::Invest)];
//! let action = agent.select_action(&state, &actions).unwrap();
//! let experience = Experience::new(state.clone(), action, Reward::scalar(1.0), state, false);
//! agent.update_experience(&experience, &actions).unwrap();
//! agent.complete_episode().unwrap();
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions
//! - [`agent`] - Agents, the learner trait and the DQN learner
//! - [`algorithms`] - Tabular Q-learning, actor-critic, advantage estimators
//! - [`builders`] - Builder for agents
//! - [`config`] - Serde-backed configuration
//! - [`encoder`] - Board snapshot to feature vector
//! - [`error`] - Error types and result handling
//! - [`export`] - Model blobs
//! - [`layers`] - Dense layers and weight initialisation
//! - [`loss`] - Huber and MSE losses
//! - [`metrics`] - Statistics, convergence and per-agent tracking
//! - [`multi_agent`] - Environment boundary, coordination, messaging, orchestration
//! - [`network`] - Feed-forward network with manual backprop
//! - [`optimizer`] - SGD and Adam
//! - [`replay_buffer`] - Uniform and prioritized experience store
//! - [`types`] - States, actions, rewards and experiences

pub mod activations;
pub mod agent;
pub mod algorithms;
pub mod builders;
pub mod config;
pub mod encoder;
pub mod error;
pub mod export;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod multi_agent;
pub mod network;
pub mod optimizer;
pub mod replay_buffer;
pub mod types;

pub use error::{PlutusError, Result};

#[cfg(test)]
mod tests;
