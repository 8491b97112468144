//! Turns a raw [`GameSnapshot`] into the fixed-length feature vector the
//! learners see, from one player's perspective.

use ndarray::Array1;
use serde::{Serialize, Deserialize};

use crate::error::{PlutusError, Result};
use crate::multi_agent::environment::{GameSnapshot, PlayerSnapshot};
use crate::types::{AgentId, State};

/// Number of features produced by [`StateEncoder::encode`]
pub const FEATURE_COUNT: usize = 12;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Money amount that maps to 1.0
    pub cash_scale: f32,
    pub max_properties: usize,
    pub max_houses: usize,
    pub max_turns: u64,
    /// Features are rounded to multiples of `1 / resolution` so that nearby
    /// situations share a table entry. Zero keeps full precision.
    pub resolution: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            cash_scale: 1500.0,
            max_properties: 28,
            max_houses: 32,
            max_turns: 200,
            resolution: 20,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StateEncoder {
    config: EncoderConfig,
}

impl StateEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        StateEncoder { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Encode `snapshot` as seen by `owner`.
    ///
    /// Features, in order: cash, net worth, board position, properties owned,
    /// houses, jailed flag, game progress, share of opponents still solvent,
    /// mean opponent net worth, richest opponent net worth, wealth rank among
    /// opponents, and share of all owned properties.
    pub fn encode(&self, snapshot: &GameSnapshot, owner: AgentId) -> Result<State> {
        let me = snapshot.player(owner).ok_or(PlutusError::UnknownAgent(owner))?;
        let opponents: Vec<&PlayerSnapshot> = snapshot.players.iter().filter(|p| p.id != owner).collect();
        let scale = self.config.cash_scale.max(f32::EPSILON);

        let solvent = opponents.iter().filter(|p| !p.bankrupt).count();
        let (mean_worth, max_worth) = if opponents.is_empty() {
            (0.0, 0.0)
        } else {
            let total: f32 = opponents.iter().map(|p| p.net_worth).sum();
            let max = opponents.iter().map(|p| p.net_worth).fold(f32::NEG_INFINITY, f32::max);
            (total / opponents.len() as f32, max)
        };
        let poorer = opponents.iter().filter(|p| p.net_worth < me.net_worth).count();
        let owned_total: usize = snapshot.players.iter().map(|p| p.properties_owned).sum();

        let raw = [
            me.cash / scale,
            me.net_worth / scale,
            ratio(me.position, snapshot.board_size),
            ratio(me.properties_owned, self.config.max_properties),
            ratio(me.houses, self.config.max_houses),
            if me.in_jail { 1.0 } else { 0.0 },
            (snapshot.turn as f32 / self.config.max_turns.max(1) as f32).min(1.0),
            ratio(solvent, opponents.len()),
            mean_worth / scale,
            max_worth / scale,
            ratio(poorer, opponents.len()),
            ratio(me.properties_owned, owned_total),
        ];

        let features = Array1::from_iter(raw.iter().map(|&v| self.quantize(v)));
        if features.iter().any(|v| !v.is_finite()) {
            return Err(PlutusError::NumericalError(format!(
                "non-finite feature encoding player {}",
                owner
            )));
        }
        Ok(State::new(features, owner, snapshot.turn))
    }

    fn quantize(&self, value: f32) -> f32 {
        if self.config.resolution == 0 {
            return value;
        }
        let steps = self.config.resolution as f32;
        let rounded = (value * steps).round() / steps;
        // keep -0.0 out of the table keys
        if rounded == 0.0 { 0.0 } else { rounded }
    }
}

fn ratio(part: usize, whole: usize) -> f32 {
    if whole == 0 {
        0.0
    } else {
        part as f32 / whole as f32
    }
}
