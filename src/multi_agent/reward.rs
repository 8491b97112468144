use serde::{Serialize, Deserialize};

use crate::error::{PlutusError, Result};
use crate::multi_agent::environment::{ActionOutcome, GameSnapshot, PlayerSnapshot};
use crate::types::{AgentId, Reward, RewardComponent};

/// Weights of the per-agent reward components
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Reward per unit of net-worth change
    pub economic_scale: f32,
    /// Reward for moving up one full rank share among opponents
    pub strategic_weight: f32,
    pub failure_penalty: f32,
    pub bankruptcy_penalty: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        RewardConfig {
            economic_scale: 0.001,
            strategic_weight: 0.5,
            failure_penalty: 0.1,
            bankruptcy_penalty: 1.0,
        }
    }
}

/// Builds each agent's [`Reward`] from the board before and after a step.
///
/// Components:
/// - `EconomicGain`: net-worth delta times `economic_scale`
/// - `StrategicAdvantage`: change in the share of solvent opponents poorer
///   than the agent, times `strategic_weight`
/// - `Environment`: whatever the engine reported for the agent
/// - `Penalty`: failed actions and going bankrupt, only when non-zero
#[derive(Clone, Debug, Default)]
pub struct RewardCalculator {
    config: RewardConfig,
}

impl RewardCalculator {
    pub fn new(config: RewardConfig) -> Self {
        RewardCalculator { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn compute(
        &self,
        agent: AgentId,
        before: &GameSnapshot,
        after: &GameSnapshot,
        environment_reward: f32,
        outcome: Option<&ActionOutcome>,
    ) -> Result<Reward> {
        let old = before.player(agent).ok_or(PlutusError::UnknownAgent(agent))?;
        let new = after.player(agent).ok_or(PlutusError::UnknownAgent(agent))?;

        let economic = (new.net_worth - old.net_worth) * self.config.economic_scale;
        let strategic = (rank_share(after, new) - rank_share(before, old)) * self.config.strategic_weight;

        let mut penalty = 0.0;
        if outcome.is_some_and(|o| !o.success) {
            penalty -= self.config.failure_penalty;
        }
        if new.bankrupt && !old.bankrupt {
            penalty -= self.config.bankruptcy_penalty;
        }

        let mut reward = Reward::from_components([
            (RewardComponent::EconomicGain, economic),
            (RewardComponent::StrategicAdvantage, strategic),
            (RewardComponent::Environment, environment_reward),
        ]);
        if penalty != 0.0 {
            reward.add(RewardComponent::Penalty, penalty);
        }
        Ok(reward)
    }
}

/// Fraction of solvent opponents with a lower net worth than `player`
fn rank_share(snapshot: &GameSnapshot, player: &PlayerSnapshot) -> f32 {
    let opponents: Vec<&PlayerSnapshot> = snapshot
        .players
        .iter()
        .filter(|p| p.id != player.id && !p.bankrupt)
        .collect();
    if opponents.is_empty() {
        return 0.0;
    }
    let poorer = opponents.iter().filter(|p| p.net_worth < player.net_worth).count();
    poorer as f32 / opponents.len() as f32
}
