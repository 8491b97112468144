#![allow(dead_code)]

use std::collections::BTreeMap;

use plutus::agent::AgentType;
use plutus::multi_agent::{
    ActionOutcome, Environment, GameSnapshot, Message, PlayerSnapshot, StepOutcome,
};
use plutus::types::{Action, ActionKind, AgentId, State};
use plutus::Result;

/// Property every agent may try to buy, so centralized coordination has
/// something to resolve
pub const CONTESTED_PROPERTY: usize = 7;
pub const PROPERTY_PRICE: f32 = 200.0;

/// Install a fmt subscriber when `RUST_LOG` is set
pub fn init_tracing() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Deterministic stand-in for the board-game engine.
///
/// Every player moves three squares per turn. `Invest` adds 10 to net worth,
/// `BuyProperty` costs 200 cash for 250 net worth and fails without the cash,
/// everything else does nothing. The game ends after `max_turns` turns.
#[derive(Debug)]
pub struct ScriptedBoard {
    pub max_turns: u64,
    pub snapshot: GameSnapshot,
    pub registered: Vec<(AgentId, AgentType)>,
    pub joint_actions: Vec<Vec<(AgentId, Action)>>,
    pub observed_messages: Vec<Message>,
    pub neighbor_override: Option<BTreeMap<AgentId, Vec<AgentId>>>,
    pub starting_cash: f32,
}

impl ScriptedBoard {
    pub fn new(max_turns: u64) -> Self {
        ScriptedBoard {
            max_turns,
            snapshot: GameSnapshot::default(),
            registered: Vec::new(),
            joint_actions: Vec::new(),
            observed_messages: Vec::new(),
            neighbor_override: None,
            starting_cash: 1500.0,
        }
    }

    pub fn with_starting_cash(mut self, cash: f32) -> Self {
        self.starting_cash = cash;
        self
    }

    fn player_mut(&mut self, id: AgentId) -> Option<&mut PlayerSnapshot> {
        self.snapshot.players.iter_mut().find(|p| p.id == id)
    }
}

impl Environment for ScriptedBoard {
    fn reset(&mut self) -> Result<GameSnapshot> {
        let cash = self.starting_cash;
        self.snapshot = GameSnapshot {
            turn: 0,
            board_size: 40,
            players: self
                .registered
                .iter()
                .enumerate()
                .map(|(seat, &(id, _))| PlayerSnapshot {
                    id,
                    cash,
                    net_worth: cash,
                    position: seat * 2,
                    ..PlayerSnapshot::default()
                })
                .collect(),
        };
        Ok(self.snapshot.clone())
    }

    fn step(&mut self, joint_action: &[(AgentId, Action)]) -> Result<StepOutcome> {
        self.joint_actions.push(joint_action.to_vec());
        let mut rewards = BTreeMap::new();
        let mut results = BTreeMap::new();

        for (id, action) in joint_action {
            let Some(player) = self.player_mut(*id) else { continue };
            let outcome = match action.kind {
                ActionKind::Invest => {
                    player.net_worth += 10.0;
                    ActionOutcome::ok()
                }
                ActionKind::BuyProperty if player.cash >= PROPERTY_PRICE => {
                    player.cash -= PROPERTY_PRICE;
                    player.net_worth += 50.0;
                    player.properties_owned += 1;
                    ActionOutcome::ok()
                }
                ActionKind::BuyProperty => ActionOutcome::failed("insufficient cash"),
                _ => ActionOutcome::ok(),
            };
            player.position = (player.position + 3) % 40;
            rewards.insert(*id, if outcome.success { 0.1 } else { 0.0 });
            results.insert(*id, outcome);
        }

        self.snapshot.turn += 1;
        Ok(StepOutcome {
            snapshot: self.snapshot.clone(),
            rewards,
            done: self.snapshot.turn >= self.max_turns,
            results,
        })
    }

    fn available_actions(&self, _state: &State) -> Vec<Action> {
        vec![
            Action::pass(),
            Action::new(ActionKind::Invest),
            Action::targeting(ActionKind::BuyProperty, CONTESTED_PROPERTY),
        ]
    }

    fn add_agent(&mut self, agent: AgentId, agent_type: AgentType) -> Result<()> {
        self.registered.push((agent, agent_type));
        Ok(())
    }

    fn remove_agent(&mut self, agent: AgentId) -> Result<()> {
        self.registered.retain(|(id, _)| *id != agent);
        Ok(())
    }

    fn agent_neighbors(&self, agent: AgentId) -> Option<Vec<AgentId>> {
        self.neighbor_override.as_ref().map(|map| map.get(&agent).cloned().unwrap_or_default())
    }

    fn deliver_message(&mut self, message: &Message) -> bool {
        self.observed_messages.push(message.clone());
        true
    }

    fn broadcast_message(&mut self, message: &Message) {
        self.observed_messages.push(message.clone());
    }
}
