use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::agent::dqn::bootstrap_value;
use crate::agent::dueling;
use crate::algorithms::{compute_gae, discounted_returns, masked_softmax, QTable, LOG_PROB_FLOOR};
use crate::multi_agent::{Message, MessageBody, MessageBus};
use crate::types::{Action, ActionKind, State};

const REWARDS: [f32; 5] = [1.0, 0.0, 2.0, -1.0, 3.0];
const VALUES: [f32; 5] = [0.5, 0.2, 0.1, 0.4, 0.3];
const DONES: [bool; 5] = [false, false, false, false, true];
const GAMMA: f32 = 0.9;

fn next_values() -> Vec<f32> {
    let mut next: Vec<f32> = VALUES[1..].to_vec();
    next.push(0.0);
    next
}

#[test]
fn test_gae_lambda_zero_is_one_step_td() {
    let next = next_values();
    let (advantages, _) = compute_gae(&REWARDS, &VALUES, &next, &DONES, GAMMA, 0.0);
    for t in 0..5 {
        let bootstrap = if DONES[t] { 0.0 } else { next[t] };
        let td = REWARDS[t] + GAMMA * bootstrap - VALUES[t];
        assert!((advantages[t] - td).abs() < 1e-5, "step {}", t);
    }
}

#[test]
fn test_gae_lambda_one_is_monte_carlo() {
    let (advantages, returns) = compute_gae(&REWARDS, &VALUES, &next_values(), &DONES, GAMMA, 1.0);
    let mc = discounted_returns(&REWARDS, &DONES, GAMMA);
    for t in 0..5 {
        assert!((advantages[t] - (mc[t] - VALUES[t])).abs() < 1e-5, "step {}", t);
        assert!((returns[t] - mc[t]).abs() < 1e-5, "step {}", t);
    }
}

#[test]
fn test_gae_empty_episode() {
    let (advantages, returns) = compute_gae(&[], &[], &[], &[], GAMMA, 0.95);
    assert!(advantages.is_empty() && returns.is_empty());
}

#[test]
fn test_unseen_states_return_initial_value() {
    let table = QTable::new(2.5);
    let state = State::new(array![4.0, 2.0], 0, 0);
    for kind in ActionKind::ALL {
        assert_eq!(table.value(state.key(), Action::new(kind).key()), 2.5);
    }
    assert_eq!(table.max_value(state.key(), &[]), 0.0);
}

#[test]
fn test_masked_softmax_zeroes_unavailable() {
    let logits = array![5.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    let mut mask = [false; ActionKind::COUNT];
    mask[1] = true;
    mask[2] = true;
    let probs = masked_softmax(logits.view(), &mask);
    assert_eq!(probs[0], 0.0);
    assert!((probs[1] - 0.5).abs() < 1e-6);
    assert!((probs.sum() - 1.0).abs() < 1e-6);

    // Extreme logits stay finite and the floor keeps log-probs bounded
    let extreme = array![1000.0, -1000.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let probs = masked_softmax(extreme.view(), &[true; ActionKind::COUNT]);
    assert!(probs.iter().all(|p| p.is_finite()));
    assert!(probs[1].max(LOG_PROB_FLOOR).ln().is_finite());
}

#[test]
fn test_dueling_advantages_are_centred() {
    let raw = array![2.0, 10.0, -4.0, 3.0];
    let q = dueling::combine(raw.view());
    let centred: Array1<f32> = &q - 2.0;
    assert!(centred.mean().unwrap().abs() < 1e-5);
    assert!((q[0] - q[1] - 14.0).abs() < 1e-5);
}

#[test]
fn test_double_dqn_reduces_overestimation() {
    let mut rng = StdRng::seed_from_u64(2024);
    let (mut double_sum, mut standard_sum) = (0.0, 0.0);
    let trials = 2000;
    for _ in 0..trials {
        // Every action is truly worth 1.0; both networks see independent noise
        let main: Array1<f32> = (0..ActionKind::COUNT).map(|_| 1.0 + rng.gen_range(-1.0f32..1.0)).collect();
        let target: Array1<f32> = (0..ActionKind::COUNT).map(|_| 1.0 + rng.gen_range(-1.0f32..1.0)).collect();
        double_sum += bootstrap_value(main.view(), target.view(), true);
        standard_sum += bootstrap_value(main.view(), target.view(), false);
    }
    let (double, standard) = (double_sum / trials as f32, standard_sum / trials as f32);
    assert!(double <= standard);
    assert!((double - 1.0).abs() < 0.1);
}

#[test]
fn test_message_to_missing_agent_is_soft_failure() {
    let mut bus = MessageBus::new();
    bus.register(0);
    let message = Message::to(
        0,
        5,
        MessageBody::ConflictNotice {
            resource: 1,
            granted_to: 0,
        },
        0,
    );
    assert!(!bus.deliver(message));
    assert_eq!(bus.dropped_count(), 1);
    assert_eq!(bus.pending(0), 0);
}
