use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::agent::traits::{first_max, LearningAlgorithm};
use crate::config::{AlgorithmKind, Hyperparameters};
use crate::error::{PlutusError, Result};
use crate::export::{ModelBlob, ModelMetadata, TableEntry};
use crate::metrics::{ConvergenceReport, ConvergenceTracker};
use crate::types::{Action, ActionKey, Experience, State, StateKey};

/// State-action value table with lazily created rows.
///
/// A state gets its row the first time it is referenced, and every cell in a
/// row reads as `initial_value` until written.
#[derive(Clone, Debug)]
pub struct QTable {
    rows: HashMap<StateKey, BTreeMap<ActionKey, f32>>,
    visits: HashMap<(StateKey, ActionKey), u64>,
    state_visits: HashMap<StateKey, u64>,
    initial_value: f32,
}

impl QTable {
    pub fn new(initial_value: f32) -> Self {
        QTable {
            rows: HashMap::new(),
            visits: HashMap::new(),
            state_visits: HashMap::new(),
            initial_value,
        }
    }

    pub fn initial_value(&self) -> f32 {
        self.initial_value
    }

    pub fn value(&self, state: StateKey, action: ActionKey) -> f32 {
        self.rows
            .get(&state)
            .and_then(|row| row.get(&action))
            .copied()
            .unwrap_or(self.initial_value)
    }

    /// Create the row for `state` if it does not exist yet
    pub fn touch(&mut self, state: StateKey) {
        self.rows.entry(state).or_default();
    }

    pub fn contains_state(&self, state: StateKey) -> bool {
        self.rows.contains_key(&state)
    }

    fn cell_mut(&mut self, state: StateKey, action: ActionKey) -> &mut f32 {
        let initial = self.initial_value;
        self.rows.entry(state).or_default().entry(action).or_insert(initial)
    }

    /// Add `delta` to a cell and return the new value
    pub fn adjust(&mut self, state: StateKey, action: ActionKey, delta: f32) -> f32 {
        let cell = self.cell_mut(state, action);
        *cell += delta;
        *cell
    }

    pub fn set(&mut self, state: StateKey, action: ActionKey, value: f32) {
        *self.cell_mut(state, action) = value;
    }

    /// Best value among `actions` in `state`; zero when there are none
    pub fn max_value(&self, state: StateKey, actions: &[ActionKey]) -> f32 {
        actions
            .iter()
            .map(|&a| self.value(state, a))
            .fold(None, |best: Option<f32>, v| Some(best.map_or(v, |b| b.max(v))))
            .unwrap_or(0.0)
    }

    pub fn record_visit(&mut self, state: StateKey, action: ActionKey) {
        *self.visits.entry((state, action)).or_insert(0) += 1;
        *self.state_visits.entry(state).or_insert(0) += 1;
    }

    pub fn visits(&self, state: StateKey, action: ActionKey) -> u64 {
        self.visits.get(&(state, action)).copied().unwrap_or(0)
    }

    pub fn state_visits(&self, state: StateKey) -> u64 {
        self.state_visits.get(&state).copied().unwrap_or(0)
    }

    /// Number of known states
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every written cell, sorted by state then action
    pub fn entries(&self) -> Vec<TableEntry> {
        let mut entries: Vec<TableEntry> = self
            .rows
            .iter()
            .flat_map(|(&state, row)| {
                row.iter().map(move |(&action, &value)| TableEntry {
                    state,
                    action,
                    value: value as f64,
                    visits: 0,
                })
            })
            .collect();
        for entry in entries.iter_mut() {
            entry.visits = self.visits(entry.state, entry.action);
        }
        entries.sort_by(|a, b| (a.state, a.action).cmp(&(b.state, b.action)));
        entries
    }

    pub fn from_entries(initial_value: f32, entries: &[TableEntry]) -> Self {
        let mut table = QTable::new(initial_value);
        for entry in entries {
            table.set(entry.state, entry.action, entry.value as f32);
            if entry.visits > 0 {
                table.visits.insert((entry.state, entry.action), entry.visits);
                *table.state_visits.entry(entry.state).or_insert(0) += entry.visits;
            }
        }
        table
    }
}

/// Tabular Q-learning with optional replacing eligibility traces (TD(λ))
#[derive(Clone, Debug)]
pub struct TabularQLearning {
    table: QTable,
    traces: HashMap<(StateKey, ActionKey), f32>,
    params: Hyperparameters,
    epsilon: f32,
    convergence: ConvergenceTracker,
    steps: u64,
    episodes: u64,
}

impl TabularQLearning {
    pub fn new(params: Hyperparameters) -> Self {
        TabularQLearning {
            table: QTable::new(params.tabular.initial_value),
            traces: HashMap::new(),
            epsilon: params.exploration.initial_rate,
            params,
            convergence: ConvergenceTracker::default(),
            steps: 0,
            episodes: 0,
        }
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn q_value(&self, state: &State, action: &Action) -> f32 {
        self.table.value(state.key(), action.key())
    }

    pub fn convergence(&self) -> ConvergenceReport {
        self.convergence.report()
    }

    pub fn active_traces(&self) -> usize {
        self.traces.len()
    }

    fn greedy(&self, state: StateKey, available: &[Action]) -> Option<usize> {
        first_max(available.iter().map(|a| self.table.value(state, a.key())))
    }
}

impl LearningAlgorithm for TabularQLearning {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Tabular
    }

    fn select_action(&mut self, state: &State, available: &[Action], rng: &mut StdRng) -> Result<Action> {
        if available.is_empty() {
            return Err(PlutusError::EmptyActionSet { agent: state.owner() });
        }
        self.table.touch(state.key());

        if rng.gen::<f32>() < self.epsilon {
            if let Some(action) = available.choose(rng) {
                return Ok(action.clone());
            }
        }
        let index = self.greedy(state.key(), available).unwrap_or(0);
        Ok(available[index].clone())
    }

    fn update(&mut self, experience: &Experience, next_available: &[Action], _rng: &mut StdRng) -> Result<Option<f32>> {
        let alpha = self.params.tabular.learning_rate;
        let gamma = self.params.discount;
        let state = experience.state.key();
        let action = experience.action.key();
        let next_state = experience.next_state.key();

        self.table.touch(next_state);
        let max_next = if experience.done {
            0.0
        } else {
            let keys: Vec<ActionKey> = next_available.iter().map(Action::key).collect();
            self.table.max_value(next_state, &keys)
        };

        let td_error = experience.reward.total() + gamma * max_next - self.table.value(state, action);
        if !td_error.is_finite() {
            return Err(PlutusError::NumericalError(format!("TD error is {}", td_error)));
        }

        if self.params.tabular.eligibility_traces {
            self.traces.insert((state, action), 1.0);
            let mut largest = 0.0f32;
            for (&(s, a), &trace) in self.traces.iter() {
                let change = alpha * td_error * trace;
                self.table.adjust(s, a, change);
                largest = largest.max(change.abs());
            }
            self.convergence.record(largest);
            let decay = gamma * self.params.tabular.trace_lambda;
            let threshold = self.params.tabular.trace_threshold;
            self.traces.retain(|_, trace| {
                *trace *= decay;
                *trace >= threshold
            });
        } else {
            let change = alpha * td_error;
            self.table.adjust(state, action, change);
            self.convergence.record(change);
        }

        self.table.record_visit(state, action);
        self.steps += 1;
        Ok(Some(td_error.abs()))
    }

    fn complete_episode(&mut self, _rng: &mut StdRng) -> Result<Option<f32>> {
        let exploration = &self.params.exploration;
        self.epsilon = (self.epsilon * exploration.decay).max(exploration.min_rate);
        self.traces.clear();
        self.episodes += 1;

        let report = self.convergence.report();
        debug!(
            episode = self.episodes,
            states = self.table.len(),
            epsilon = self.epsilon,
            mean_change = report.mean_change,
            stability = report.stability,
            "tabular episode complete"
        );
        Ok(None)
    }

    fn exploration_rate(&self) -> f32 {
        self.epsilon
    }

    fn set_exploration_rate(&mut self, rate: f32) {
        self.epsilon = rate.clamp(0.0, 1.0);
    }

    fn save(&self) -> ModelBlob {
        ModelBlob::from_table(
            self.table.entries(),
            self.params.clone(),
            self.epsilon,
            ModelMetadata::new(self.steps, self.episodes),
        )
    }

    fn load(&mut self, blob: &ModelBlob) -> Result<()> {
        blob.expect_algorithm(AlgorithmKind::Tabular)?;
        let entries = blob.table.as_deref().unwrap_or(&[]);
        self.table = QTable::from_entries(self.params.tabular.initial_value, entries);
        self.traces.clear();
        self.epsilon = blob.exploration_rate.clamp(0.0, 1.0);
        self.steps = blob.metadata.step_count;
        self.episodes = blob.metadata.episode_count;
        Ok(())
    }
}
