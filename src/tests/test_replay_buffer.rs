use ndarray::array;
use rand::rngs::StdRng;
use rand::SeedableRng;
use crate::replay_buffer::{ExperienceStore, SamplingMode};
use crate::types::{Action, ActionKind, Experience, Reward, State};

fn experience(i: usize) -> Experience {
    Experience::new(
        State::new(array![i as f32], 0, i as u64),
        Action::new(ActionKind::Invest),
        Reward::scalar(i as f32),
        State::new(array![(i + 1) as f32], 0, i as u64 + 1),
        false,
    )
}

fn prioritized(capacity: usize) -> ExperienceStore {
    ExperienceStore::new(capacity, SamplingMode::Prioritized { alpha: 1.0, beta: 1.0 }).unwrap()
}

#[test]
fn test_store_add_and_sample() {
    let mut store = ExperienceStore::uniform(10).unwrap();
    assert!(store.is_empty());
    store.push(experience(0));
    assert_eq!(store.len(), 1);

    let batch = store.sample(1, &mut StdRng::seed_from_u64(0)).unwrap();
    assert_eq!(batch.experiences[0], &experience(0));
    assert_eq!(batch.weights, vec![1.0]);
}

#[test]
fn test_store_overwrites_by_ring_index() {
    let mut store = ExperienceStore::uniform(3).unwrap();
    let slots: Vec<usize> = (0..5).map(|i| store.push(experience(i))).collect();

    assert_eq!(slots, vec![0, 1, 2, 0, 1]);
    assert_eq!(store.len(), 3);
    assert_eq!(store.insert_count(), 5);
    assert_eq!(store.get(0).unwrap().state.features()[0], 3.0);
    assert_eq!(store.get(1).unwrap().state.features()[0], 4.0);
    assert_eq!(store.get(2).unwrap().state.features()[0], 2.0);
}

#[test]
fn test_zero_capacity_rejected() {
    assert!(ExperienceStore::uniform(0).is_err());
}

#[test]
fn test_underfilled_store_skips_batch() {
    let mut store = ExperienceStore::uniform(10).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    for i in 0..3 {
        store.push(experience(i));
    }
    assert!(store.sample(4, &mut rng).is_none());
    store.push(experience(3));
    assert_eq!(store.sample(4, &mut rng).unwrap().len(), 4);
}

#[test]
fn test_uniform_sampling_is_without_replacement() {
    let mut store = ExperienceStore::uniform(8).unwrap();
    for i in 0..8 {
        store.push(experience(i));
    }
    let batch = store.sample(8, &mut StdRng::seed_from_u64(1)).unwrap();
    let mut indices = batch.indices.clone();
    indices.sort_unstable();
    assert_eq!(indices, (0..8).collect::<Vec<_>>());
}

#[test]
fn test_new_experiences_get_max_priority() {
    let mut store = prioritized(4);
    store.push(experience(0));
    store.push(experience(1));
    store.update_priorities(&[0], &[5.0]);
    let slot = store.push(experience(2));

    assert!((store.priority(0).unwrap() - 5.001).abs() < 1e-4);
    assert!((store.priority(1).unwrap() - 1.0).abs() < 1e-6);
    assert_eq!(store.priority(slot), store.priority(0));
}

#[test]
fn test_prioritized_sampling_prefers_high_priority() {
    let mut store = prioritized(4);
    for i in 0..4 {
        store.push(experience(i));
    }
    store.update_priorities(&[0, 1, 2, 3], &[0.0, 0.0, 0.0, 9.0]);

    let mut rng = StdRng::seed_from_u64(17);
    let mut hits = 0;
    let draws = 200;
    for _ in 0..draws {
        let batch = store.sample(1, &mut rng).unwrap();
        if batch.indices[0] == 3 {
            hits += 1;
        }
    }
    assert!(hits > draws * 9 / 10, "slot 3 drawn {} of {} times", hits, draws);
}

#[test]
fn test_importance_weights_are_max_normalised() {
    let mut store = prioritized(3);
    for i in 0..3 {
        store.push(experience(i));
    }
    store.update_priorities(&[0, 1, 2], &[1.0, 2.0, 4.0]);

    assert!(store.sample(4, &mut StdRng::seed_from_u64(8)).is_none());
    let batch = store.sample(3, &mut StdRng::seed_from_u64(8)).unwrap();
    assert_eq!(batch.len(), 3);
    let max = batch.weights.iter().cloned().fold(0.0f32, f32::max);
    assert!((max - 1.0).abs() < 1e-6);
    assert!(batch.weights.iter().all(|&w| w > 0.0 && w <= 1.0));

    // alpha = beta = 1: weight times priority is the same for every sample
    let scaled: Vec<f32> = batch
        .indices
        .iter()
        .zip(&batch.weights)
        .map(|(&slot, &w)| w * store.priority(slot).unwrap())
        .collect();
    for v in &scaled {
        assert!((v - scaled[0]).abs() < 1e-4 * scaled[0]);
    }

    // Rarer slots weigh more
    for (&slot, &w) in batch.indices.iter().zip(&batch.weights) {
        for (&other, &v) in batch.indices.iter().zip(&batch.weights) {
            if store.priority(slot) < store.priority(other) {
                assert!(w >= v);
            }
        }
    }
}

#[test]
fn test_uniform_mode_ignores_priorities() {
    let mut store = ExperienceStore::uniform(2).unwrap();
    store.push(experience(0));
    store.update_priorities(&[0], &[3.0]);
    assert_eq!(store.priority(0), None);
    assert_eq!(store.mode(), SamplingMode::Uniform);
}
