use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::config::AlgorithmKind;
use crate::error::Result;
use crate::export::ModelBlob;
use crate::types::{Action, ActionKind, Experience, State};

/// Capability shared by every learner.
///
/// An agent picks its implementation once, at construction, and only talks
/// to it through this trait afterwards.
pub trait LearningAlgorithm: Send {
    fn kind(&self) -> AlgorithmKind;

    /// Choose one of `available`. Implementations return
    /// `PlutusError::EmptyActionSet` when `available` is empty.
    fn select_action(&mut self, state: &State, available: &[Action], rng: &mut StdRng) -> Result<Action>;

    /// Learn from one transition. `next_available` holds the actions legal in
    /// `experience.next_state` and is empty for terminal transitions.
    /// Returns a loss or TD-error magnitude when a learning step happened.
    fn update(&mut self, experience: &Experience, next_available: &[Action], rng: &mut StdRng) -> Result<Option<f32>>;

    /// End-of-episode hook (exploration decay, batch updates, trace resets)
    fn complete_episode(&mut self, rng: &mut StdRng) -> Result<Option<f32>>;

    fn exploration_rate(&self) -> f32;

    fn set_exploration_rate(&mut self, rate: f32);

    fn save(&self) -> ModelBlob;

    fn load(&mut self, blob: &ModelBlob) -> Result<()>;
}

/// Index of the first maximum of `values`. NaN never wins.
pub(crate) fn first_max<I>(values: I) -> Option<usize>
where
    I: IntoIterator<Item = f32>,
{
    let mut best: Option<(usize, f32)> = None;
    for (i, v) in values.into_iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// One of the `available` actions of `kind`, uniformly at random
pub(crate) fn choose_of_kind<'a>(available: &'a [Action], kind: ActionKind, rng: &mut StdRng) -> Option<&'a Action> {
    let candidates: Vec<&Action> = available.iter().filter(|a| a.kind == kind).collect();
    match candidates.as_slice() {
        [only] => Some(*only),
        _ => candidates.choose(rng).copied(),
    }
}
