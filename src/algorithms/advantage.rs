//! Return and advantage estimators used by the policy-gradient learner.

/// Discounted returns `G_t = r_t + γ·G_{t+1}`, restarting after every
/// terminal step.
pub fn discounted_returns(rewards: &[f32], dones: &[bool], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.0; rewards.len()];
    let mut running = 0.0;
    for t in (0..rewards.len()).rev() {
        if dones.get(t).copied().unwrap_or(false) {
            running = 0.0;
        }
        running = rewards[t] + gamma * running;
        returns[t] = running;
    }
    returns
}

/// Generalized advantage estimation.
///
/// `values[t]` is `V(s_t)` and `next_values[t]` is `V(s_{t+1})`; the latter is
/// ignored for terminal steps. Returns `(advantages, returns)` where
/// `returns[t] = advantages[t] + values[t]` is the critic target.
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    next_values: &[f32],
    dones: &[bool],
    gamma: f32,
    lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len();
    let mut advantages = vec![0.0; n];
    let mut returns = vec![0.0; n];
    let mut gae = 0.0;

    for t in (0..n).rev() {
        let terminal = dones.get(t).copied().unwrap_or(false);
        let bootstrap = if terminal { 0.0 } else { next_values.get(t).copied().unwrap_or(0.0) };
        let value = values.get(t).copied().unwrap_or(0.0);
        let delta = rewards[t] + gamma * bootstrap - value;
        let carried = if terminal { 0.0 } else { gae };
        gae = delta + gamma * lambda * carried;
        advantages[t] = gae;
        returns[t] = gae + value;
    }

    (advantages, returns)
}
