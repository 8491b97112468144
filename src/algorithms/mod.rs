//! # Learning Algorithms
//!
//! Tabular and policy-gradient learners, plus the return/advantage estimators
//! they share. The deep Q-network learner lives in [`crate::agent::dqn`] next
//! to its dueling head.
//!
//! | Learner | Value representation | Update schedule |
//! |---------|----------------------|-----------------|
//! | [`TabularQLearning`] | lazily created state-action table, optional TD(λ) traces | every step |
//! | [`DqnLearner`](crate::agent::DqnLearner) | main + target network, replay store | every step once a batch is stored |
//! | [`ActorCritic`] | softmax actor + scalar critic | optional per-step update, plus one per episode |
//!
//! ## Example
//!
//! ```
//! use plutus::algorithms::compute_gae;
//!
//! let rewards = [1.0, 1.0, 1.0];
//! let values = [0.5, 0.5, 0.5];
//! let next_values = [0.5, 0.5, 0.0];
//! let dones = [false, false, true];
//! let (advantages, returns) = compute_gae(&rewards, &values, &next_values, &dones, 0.9, 0.0);
//! assert!((advantages[2] - 0.5).abs() < 1e-6);
//! assert!((returns[2] - 1.0).abs() < 1e-6);
//! ```

pub mod actor_critic;
pub mod advantage;
pub mod q_learning;

pub use actor_critic::{masked_softmax, ActorCritic, ActionMask, LOG_PROB_FLOOR};
pub use advantage::{compute_gae, discounted_returns};
pub use q_learning::{QTable, TabularQLearning};
