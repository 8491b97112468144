use std::collections::{BTreeMap, VecDeque};

use serde::{Serialize, Deserialize};

use crate::metrics::statistics::{RunningStats, Statistics};
use crate::types::ActionKind;

/// Reward bookkeeping for one action kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub total_reward: f32,
    pub count: usize,
}

impl ActionRecord {
    pub fn average(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            self.total_reward / self.count as f32
        }
    }
}

/// What a cooperative agent tells its peers about itself
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub best_action: ActionKind,
    pub average_reward: f32,
    pub episodes: usize,
}

/// Per-agent training statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatistics {
    /// Completed episode returns, newest last
    pub episode_rewards: VecDeque<f32>,
    pub episode_lengths: VecDeque<usize>,
    pub losses: VecDeque<f32>,
    history_size: usize,

    current_episode_reward: f32,
    current_episode_length: usize,
    episode_count: usize,
    total_steps: usize,

    action_rewards: BTreeMap<ActionKind, ActionRecord>,
    loss_stats: RunningStats,
    checked_average: Option<f32>,
}

impl AgentStatistics {
    pub fn new(history_size: usize) -> Self {
        AgentStatistics {
            episode_rewards: VecDeque::with_capacity(history_size),
            episode_lengths: VecDeque::with_capacity(history_size),
            losses: VecDeque::with_capacity(history_size),
            history_size: history_size.max(1),
            current_episode_reward: 0.0,
            current_episode_length: 0,
            episode_count: 0,
            total_steps: 0,
            action_rewards: BTreeMap::new(),
            loss_stats: RunningStats::new(),
            checked_average: None,
        }
    }

    /// Record one environment step taken with `action`
    pub fn record_step(&mut self, action: ActionKind, reward: f32) {
        self.current_episode_reward += reward;
        self.current_episode_length += 1;
        self.total_steps += 1;

        let record = self.action_rewards.entry(action).or_default();
        record.total_reward += reward;
        record.count += 1;
    }

    pub fn record_loss(&mut self, loss: f32) {
        push_bounded(&mut self.losses, loss, self.history_size);
        self.loss_stats.update(loss);
    }

    /// Close the running episode and return its total reward
    pub fn end_episode(&mut self) -> f32 {
        let reward = self.current_episode_reward;
        push_bounded(&mut self.episode_rewards, reward, self.history_size);
        push_bounded(&mut self.episode_lengths, self.current_episode_length, self.history_size);
        self.episode_count += 1;
        self.current_episode_reward = 0.0;
        self.current_episode_length = 0;
        reward
    }

    pub fn current_episode_reward(&self) -> f32 {
        self.current_episode_reward
    }

    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Mean return over the last `window` episodes
    pub fn moving_average(&self, window: usize) -> Option<f32> {
        if self.episode_rewards.is_empty() || window == 0 {
            return None;
        }
        let n = window.min(self.episode_rewards.len());
        let sum: f32 = self.episode_rewards.iter().rev().take(n).sum();
        Some(sum / n as f32)
    }

    /// Compare the current moving average with the one seen at the previous
    /// check. `None` on the first check or before any episode finished.
    pub fn check_improvement(&mut self, window: usize) -> Option<bool> {
        let current = self.moving_average(window)?;
        let previous = self.checked_average.replace(current);
        previous.map(|prev| current > prev)
    }

    pub fn action_record(&self, action: ActionKind) -> ActionRecord {
        self.action_rewards.get(&action).copied().unwrap_or_default()
    }

    /// Action kind with the highest average reward; earliest kind wins ties
    pub fn best_action(&self) -> Option<(ActionKind, f32)> {
        let mut best: Option<(ActionKind, f32)> = None;
        for (&kind, record) in &self.action_rewards {
            if record.count == 0 {
                continue;
            }
            let average = record.average();
            if best.map_or(true, |(_, b)| average > b) {
                best = Some((kind, average));
            }
        }
        best
    }

    pub fn strategy_summary(&self, window: usize) -> Option<StrategySummary> {
        let (best_action, _) = self.best_action()?;
        Some(StrategySummary {
            best_action,
            average_reward: self.moving_average(window).unwrap_or(0.0),
            episodes: self.episode_count,
        })
    }

    pub fn reward_statistics(&self) -> Statistics {
        Statistics::from_values(self.episode_rewards.iter().copied())
    }

    pub fn loss_statistics(&self) -> Statistics {
        self.loss_stats.to_statistics()
    }
}

impl Default for AgentStatistics {
    fn default() -> Self {
        Self::new(1000)
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, limit: usize) {
    if queue.len() >= limit {
        queue.pop_front();
    }
    queue.push_back(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_bookkeeping() {
        let mut stats = AgentStatistics::new(2);
        for reward in [1.0, 2.0, 3.0] {
            stats.record_step(ActionKind::Pass, reward);
            assert_eq!(stats.end_episode(), reward);
        }
        assert_eq!(stats.episode_count(), 3);
        assert_eq!(stats.episode_rewards.len(), 2);
        assert_eq!(stats.moving_average(10), Some(2.5));
        assert_eq!(stats.moving_average(1), Some(3.0));
        assert_eq!(stats.total_steps(), 3);
    }

    #[test]
    fn test_best_action_by_average_reward() {
        let mut stats = AgentStatistics::default();
        stats.record_step(ActionKind::BuyProperty, 4.0);
        stats.record_step(ActionKind::BuyProperty, 0.0);
        stats.record_step(ActionKind::Invest, 3.0);
        stats.record_step(ActionKind::Pass, -1.0);
        assert_eq!(stats.best_action(), Some((ActionKind::Invest, 3.0)));
        assert_eq!(stats.action_record(ActionKind::BuyProperty).average(), 2.0);
    }

    #[test]
    fn test_improvement_check() {
        let mut stats = AgentStatistics::default();
        assert_eq!(stats.check_improvement(5), None);
        stats.record_step(ActionKind::Pass, 1.0);
        stats.end_episode();
        assert_eq!(stats.check_improvement(5), None);
        stats.record_step(ActionKind::Pass, 3.0);
        stats.end_episode();
        assert_eq!(stats.check_improvement(5), Some(true));
        stats.record_step(ActionKind::Pass, -10.0);
        stats.end_episode();
        assert_eq!(stats.check_improvement(5), Some(false));
    }
}
