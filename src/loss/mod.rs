//! # Loss Functions Module
//!
//! Scalar losses used by the learners: Huber for Q-value regression and
//! squared error for the critic.

pub mod functions;

pub use functions::{HuberLoss, Loss, MSE};
