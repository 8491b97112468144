use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::agent::AgentType;
use crate::error::Result;
use crate::multi_agent::communication::Message;
use crate::types::{Action, AgentId, State};

/// Per-agent actions for one step, in agent registration order.
/// Order matters: centralized coordination grants contested resources to the
/// first claimant listed.
pub type JointAction = Vec<(AgentId, Action)>;

/// Raw per-player view of the board reported by the game engine
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: AgentId,
    pub cash: f32,
    pub net_worth: f32,
    /// Board square index
    pub position: usize,
    pub properties_owned: usize,
    pub houses: usize,
    pub in_jail: bool,
    pub bankrupt: bool,
}

/// Raw game state the engine hands to the training core
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub turn: u64,
    pub board_size: usize,
    pub players: Vec<PlayerSnapshot>,
}

impl GameSnapshot {
    pub fn player(&self, id: AgentId) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Steps between two squares going the short way round the board
    pub fn board_distance(&self, a: usize, b: usize) -> usize {
        if self.board_size == 0 {
            return a.abs_diff(b);
        }
        let forward = a.abs_diff(b) % self.board_size;
        forward.min(self.board_size - forward)
    }

    /// Solvent players within `distance` squares of `agent`, excluding `agent`
    pub fn neighbors(&self, agent: AgentId, distance: usize) -> Vec<AgentId> {
        let origin = match self.player(agent) {
            Some(player) => player.position,
            None => return Vec::new(),
        };
        self.players
            .iter()
            .filter(|p| p.id != agent && !p.bankrupt)
            .filter(|p| self.board_distance(origin, p.position) <= distance)
            .map(|p| p.id)
            .collect()
    }

    /// Solvent player with the highest net worth; earliest listed wins ties
    pub fn wealthiest<'a, I>(&self, among: I) -> Option<AgentId>
    where
        I: IntoIterator<Item = &'a AgentId>,
    {
        let mut best: Option<(AgentId, f32)> = None;
        for &id in among {
            if let Some(player) = self.player(id).filter(|p| !p.bankrupt) {
                if best.map_or(true, |(_, worth)| player.net_worth > worth) {
                    best = Some((id, player.net_worth));
                }
            }
        }
        best.map(|(id, _)| id)
    }
}

/// Result of executing one agent's action. Illegal or impossible actions are
/// reported here rather than as errors so the episode can continue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub reason: Option<String>,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        ActionOutcome {
            success: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        ActionOutcome {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// What the engine returns from one step
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub snapshot: GameSnapshot,
    /// Engine-side reward per agent; missing agents receive zero
    pub rewards: BTreeMap<AgentId, f32>,
    pub done: bool,
    /// Execution result per agent; missing agents count as successful
    pub results: BTreeMap<AgentId, ActionOutcome>,
}

/// Boundary to the game engine.
///
/// `step` is the only call that may block for a long time; the orchestrator
/// waits for it before doing anything else.
pub trait Environment {
    fn reset(&mut self) -> Result<GameSnapshot>;

    fn step(&mut self, joint_action: &[(AgentId, Action)]) -> Result<StepOutcome>;

    /// Legal actions for the player owning `state`
    fn available_actions(&self, state: &State) -> Vec<Action>;

    fn add_agent(&mut self, _agent: AgentId, _agent_type: AgentType) -> Result<()> {
        Ok(())
    }

    fn remove_agent(&mut self, _agent: AgentId) -> Result<()> {
        Ok(())
    }

    /// Engine-defined neighbourhood. `None` falls back to board distance.
    fn agent_neighbors(&self, _agent: AgentId) -> Option<Vec<AgentId>> {
        None
    }

    /// Observe a point-to-point message routed by the core. Returns whether
    /// the engine accepted it.
    fn deliver_message(&mut self, _message: &Message) -> bool {
        false
    }

    /// Observe a broadcast routed by the core
    fn broadcast_message(&mut self, _message: &Message) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> GameSnapshot {
        let player = |id, position, net_worth| PlayerSnapshot {
            id,
            position,
            net_worth,
            ..PlayerSnapshot::default()
        };
        GameSnapshot {
            turn: 3,
            board_size: 40,
            players: vec![player(0, 1, 900.0), player(1, 38, 1200.0), player(2, 20, 1200.0)],
        }
    }

    #[test]
    fn test_board_distance_wraps() {
        let snap = snapshot();
        assert_eq!(snap.board_distance(1, 38), 3);
        assert_eq!(snap.board_distance(38, 1), 3);
        assert_eq!(snap.board_distance(0, 20), 20);
    }

    #[test]
    fn test_neighbors_within_distance() {
        let snap = snapshot();
        assert_eq!(snap.neighbors(0, 6), vec![1]);
        assert!(snap.neighbors(2, 6).is_empty());
        assert!(snap.neighbors(9, 6).is_empty());
    }

    #[test]
    fn test_wealthiest_prefers_first_on_tie() {
        let snap = snapshot();
        assert_eq!(snap.wealthiest(&[0, 1, 2]), Some(1));
        assert_eq!(snap.wealthiest(&[2, 1]), Some(2));
        assert_eq!(snap.wealthiest(&[]), None);
    }
}
