//! Core value types shared by every component: states, actions, rewards and
//! the experience tuples the learners consume.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array1, ArrayView1};
use serde::{Serialize, Deserialize};

/// Identifier of an agent (one per player seat)
pub type AgentId = usize;

/// Identifier of a contestable board resource (a property tile)
pub type ResourceId = usize;

/// Stable content hash of a state's feature vector, used as table key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey(pub u64);

impl StateKey {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    /// FNV-1a over the IEEE bit patterns of the features. `-0.0` hashes like `0.0`.
    pub fn from_features(features: ArrayView1<f32>) -> Self {
        let mut hash = Self::OFFSET_BASIS;
        for &value in features.iter() {
            let normalized = if value == 0.0 { 0.0f32 } else { value };
            for byte in normalized.to_bits().to_le_bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(Self::PRIME);
            }
        }
        StateKey(hash)
    }
}

/// Immutable snapshot of the game from one player's perspective
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct State {
    features: Array1<f32>,
    owner: AgentId,
    timestamp: u64,
    key: StateKey,
}

impl State {
    pub fn new(features: Array1<f32>, owner: AgentId, timestamp: u64) -> Self {
        let key = StateKey::from_features(features.view());
        State {
            features,
            owner,
            timestamp,
            key,
        }
    }

    pub fn features(&self) -> ArrayView1<'_, f32> {
        self.features.view()
    }

    pub fn owner(&self) -> AgentId {
        self.owner
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn key(&self) -> StateKey {
        self.key
    }

    pub fn dim(&self) -> usize {
        self.features.len()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.features == other.features
    }
}

/// The fixed discrete action vocabulary of the board game
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Do nothing this turn; also the substitute for rejected actions
    Pass,
    BuyProperty,
    BuildHouse,
    SellProperty,
    Mortgage,
    Trade,
    Invest,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Pass,
        ActionKind::BuyProperty,
        ActionKind::BuildHouse,
        ActionKind::SellProperty,
        ActionKind::Mortgage,
        ActionKind::Trade,
        ActionKind::Invest,
    ];

    /// Size of the vocabulary, i.e. the width of every policy / Q output layer
    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Pass => "pass",
            ActionKind::BuyProperty => "buy_property",
            ActionKind::BuildHouse => "build_house",
            ActionKind::SellProperty => "sell_property",
            ActionKind::Mortgage => "mortgage",
            ActionKind::Trade => "trade",
            ActionKind::Invest => "invest",
        };
        f.write_str(name)
    }
}

/// Structured parameters of an action
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionParams {
    pub target: Option<ResourceId>,
    pub amount: Option<f32>,
    pub counterparty: Option<AgentId>,
}

/// Why a coordination step replaced an agent's action
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub reason: String,
    pub original: Box<Action>,
}

/// Identity of an action inside a value table: kind plus targeted resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionKey {
    pub kind: ActionKind,
    pub target: Option<ResourceId>,
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Some(target) => write!(f, "{}:{}", self.kind, target),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// An action proposal or executed action
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub params: Option<ActionParams>,
    pub confidence: f32,
    pub resolution: Option<Resolution>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Action {
            kind,
            params: None,
            confidence: 1.0,
            resolution: None,
        }
    }

    /// The no-op action
    pub fn pass() -> Self {
        Self::new(ActionKind::Pass)
    }

    /// Low-confidence pass used when a policy cannot produce a choice
    pub fn fallback() -> Self {
        Self::pass().with_confidence(0.1)
    }

    pub fn targeting(kind: ActionKind, target: ResourceId) -> Self {
        Action {
            params: Some(ActionParams {
                target: Some(target),
                ..ActionParams::default()
            }),
            ..Self::new(kind)
        }
    }

    pub fn with_params(mut self, params: ActionParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn target(&self) -> Option<ResourceId> {
        self.params.as_ref().and_then(|p| p.target)
    }

    pub fn key(&self) -> ActionKey {
        ActionKey {
            kind: self.kind,
            target: self.target(),
        }
    }

    /// A pass that records `original` as the action it replaced
    pub fn substitute_for(original: &Action, reason: impl Into<String>) -> Self {
        Action {
            resolution: Some(Resolution {
                reason: reason.into(),
                original: Box::new(original.clone()),
            }),
            ..Self::pass()
        }
    }

    pub fn is_substituted(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Named reward components. They are summed, never renormalised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardComponent {
    EconomicGain,
    StrategicAdvantage,
    Environment,
    Penalty,
}

/// Scalar reward with its additive breakdown
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    total: f32,
    components: BTreeMap<RewardComponent, f32>,
}

impl Reward {
    /// A reward with a single environment component
    pub fn scalar(value: f32) -> Self {
        Self::from_components([(RewardComponent::Environment, value)])
    }

    pub fn from_components<I>(components: I) -> Self
    where
        I: IntoIterator<Item = (RewardComponent, f32)>,
    {
        let mut reward = Reward::default();
        for (component, value) in components {
            reward.add(component, value);
        }
        reward
    }

    pub fn add(&mut self, component: RewardComponent, value: f32) {
        *self.components.entry(component).or_insert(0.0) += value;
        self.total = self.components.values().sum();
    }

    pub fn total(&self) -> f32 {
        self.total
    }

    pub fn component(&self, component: RewardComponent) -> f32 {
        self.components.get(&component).copied().unwrap_or(0.0)
    }

    pub fn components(&self) -> &BTreeMap<RewardComponent, f32> {
        &self.components
    }
}

/// Post-hoc advantage/return annotation written by the actor-critic learner
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    pub advantage: f32,
    pub return_estimate: f32,
}

/// One transition. Annotations are attached by producing a new value, the
/// stored experience is never modified.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: State,
    pub action: Action,
    pub reward: Reward,
    pub next_state: State,
    pub done: bool,
    pub annotations: Option<Annotations>,
}

impl Experience {
    pub fn new(state: State, action: Action, reward: Reward, next_state: State, done: bool) -> Self {
        Experience {
            state,
            action,
            reward,
            next_state,
            done,
            annotations: None,
        }
    }

    pub fn annotated(&self, advantage: f32, return_estimate: f32) -> Self {
        Experience {
            annotations: Some(Annotations {
                advantage,
                return_estimate,
            }),
            ..self.clone()
        }
    }
}
