//! # Multi-Agent Training
//!
//! Everything between individual learners and the game engine.
//!
//! ## Core Concepts
//!
//! - **Environment**: the [`Environment`] trait is the only contact with the
//!   board-game engine. It reports raw [`GameSnapshot`]s; the
//!   [`StateEncoder`](crate::encoder::StateEncoder) turns them into states.
//! - **Coordination**: a [`Coordinator`] turns per-agent proposals into the
//!   joint action under one [`CoordinationProtocol`].
//! - **Communication**: agents only learn about each other through
//!   [`Message`]s routed by the [`MessageBus`].
//! - **Orchestration**: the [`TrainingOrchestrator`] runs episodes, computes
//!   rewards, feeds experiences back, and publishes [`TrainingEvent`]s.
//!
//! ## Protocols
//!
//! | Protocol | Joint action | Messages |
//! |----------|--------------|----------|
//! | `none` | unchanged | none |
//! | `centralized` | losers of a contested resource pass | conflict notices |
//! | `distributed` | unchanged | intentions to neighbours |
//! | `hierarchical` | unchanged | leader directives to followers |

pub mod communication;
pub mod coordination;
pub mod environment;
pub mod events;
pub mod reward;
pub mod trainer;

pub use communication::{Message, MessageBody, MessageBus, Recipient};
pub use coordination::{detect_conflicts, directive_for, Conflict, CoordinationOutcome, CoordinationProtocol, Coordinator};
pub use environment::{ActionOutcome, Environment, GameSnapshot, JointAction, PlayerSnapshot, StepOutcome};
pub use events::{EventBus, TrainingEvent};
pub use reward::{RewardCalculator, RewardConfig};
pub use trainer::{EpisodeSummary, TrainingOrchestrator, TrainingReport};
