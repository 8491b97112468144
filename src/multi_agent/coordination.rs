use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::multi_agent::communication::{Message, MessageBody, MessageBus};
use crate::multi_agent::environment::{GameSnapshot, JointAction};
use crate::types::{Action, ActionKind, AgentId, ResourceId};

/// How independently chosen actions become one joint action. Fixed for a
/// training run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationProtocol {
    /// Actions pass through untouched
    #[default]
    None,
    /// Contested resources go to the first claimant; everyone else passes
    Centralized,
    /// Agents tell their neighbours what they intend; actions are unchanged
    Distributed,
    /// The wealthiest agent leads and sends followers suggestions
    Hierarchical,
}

/// A resource claimed by more than one agent in the same step
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub resource: ResourceId,
    /// In proposal order; the first one wins under centralized coordination
    pub claimants: Vec<AgentId>,
    pub severity: usize,
}

impl Conflict {
    pub fn winner(&self) -> Option<AgentId> {
        self.claimants.first().copied()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoordinationOutcome {
    pub joint: JointAction,
    pub conflicts: Vec<Conflict>,
    /// Elected leader, hierarchical protocol only
    pub leader: Option<AgentId>,
    /// Every message handed to the bus, delivered or not
    pub messages: Vec<Message>,
    pub delivered: usize,
}

/// Group the proposals by targeted resource and report every resource with
/// more than one claimant, ordered by resource id
pub fn detect_conflicts(proposals: &[(AgentId, Action)]) -> Vec<Conflict> {
    let mut claims: BTreeMap<ResourceId, Vec<AgentId>> = BTreeMap::new();
    for (agent, action) in proposals {
        if let Some(resource) = action.target() {
            claims.entry(resource).or_default().push(*agent);
        }
    }
    claims
        .into_iter()
        .filter(|(_, claimants)| claimants.len() > 1)
        .map(|(resource, claimants)| Conflict {
            resource,
            severity: claimants.len(),
            claimants,
        })
        .collect()
}

/// Suggestion a leader sends to its followers, keyed on its own action
pub fn directive_for(leader_action: ActionKind) -> ActionKind {
    match leader_action {
        ActionKind::BuyProperty => ActionKind::Invest,
        ActionKind::BuildHouse => ActionKind::BuyProperty,
        ActionKind::SellProperty => ActionKind::Pass,
        ActionKind::Trade => ActionKind::Trade,
        _ => ActionKind::Pass,
    }
}

#[derive(Clone, Debug, Default)]
pub struct Coordinator {
    protocol: CoordinationProtocol,
}

impl Coordinator {
    pub fn new(protocol: CoordinationProtocol) -> Self {
        Coordinator { protocol }
    }

    pub fn protocol(&self) -> CoordinationProtocol {
        self.protocol
    }

    /// Turn the per-agent proposals into the joint action sent to the
    /// environment. `neighbors` is only consulted by the distributed protocol.
    pub fn coordinate(
        &self,
        proposals: JointAction,
        snapshot: &GameSnapshot,
        neighbors: &BTreeMap<AgentId, Vec<AgentId>>,
        bus: &mut MessageBus,
        timestamp: u64,
    ) -> CoordinationOutcome {
        match self.protocol {
            CoordinationProtocol::None => CoordinationOutcome {
                joint: proposals,
                ..CoordinationOutcome::default()
            },
            CoordinationProtocol::Centralized => Self::centralized(proposals, bus, timestamp),
            CoordinationProtocol::Distributed => Self::distributed(proposals, neighbors, bus, timestamp),
            CoordinationProtocol::Hierarchical => Self::hierarchical(proposals, snapshot, bus, timestamp),
        }
    }

    fn centralized(mut proposals: JointAction, bus: &mut MessageBus, timestamp: u64) -> CoordinationOutcome {
        let conflicts = detect_conflicts(&proposals);
        let mut outcome = CoordinationOutcome::default();

        for conflict in &conflicts {
            let Some(winner) = conflict.winner() else { continue };
            warn!(
                resource = conflict.resource,
                severity = conflict.severity,
                winner,
                "resource conflict"
            );
            for &loser in &conflict.claimants[1..] {
                if let Some((_, action)) = proposals.iter_mut().find(|(id, _)| *id == loser) {
                    let reason = format!("resource {} granted to agent {}", conflict.resource, winner);
                    *action = Action::substitute_for(action, reason);
                }
                let notice = Message::to(
                    winner,
                    loser,
                    MessageBody::ConflictNotice {
                        resource: conflict.resource,
                        granted_to: winner,
                    },
                    timestamp,
                )
                .with_priority(2);
                outcome.send(bus, notice);
            }
        }

        outcome.joint = proposals;
        outcome.conflicts = conflicts;
        outcome
    }

    fn distributed(
        proposals: JointAction,
        neighbors: &BTreeMap<AgentId, Vec<AgentId>>,
        bus: &mut MessageBus,
        timestamp: u64,
    ) -> CoordinationOutcome {
        let mut outcome = CoordinationOutcome::default();
        for (agent, action) in &proposals {
            for &neighbor in neighbors.get(agent).into_iter().flatten() {
                if neighbor == *agent {
                    continue;
                }
                let info = Message::to(
                    *agent,
                    neighbor,
                    MessageBody::Information {
                        intended: action.kind,
                        target: action.target(),
                    },
                    timestamp,
                );
                outcome.send(bus, info);
            }
        }
        debug!(sent = outcome.messages.len(), delivered = outcome.delivered, "intentions shared");
        outcome.joint = proposals;
        outcome
    }

    fn hierarchical(
        proposals: JointAction,
        snapshot: &GameSnapshot,
        bus: &mut MessageBus,
        timestamp: u64,
    ) -> CoordinationOutcome {
        let mut outcome = CoordinationOutcome::default();
        let participants: Vec<AgentId> = proposals.iter().map(|(id, _)| *id).collect();
        let leader = snapshot.wealthiest(&participants);
        let leader_action = leader.and_then(|l| proposals.iter().find(|(id, _)| *id == l).map(|(_, a)| a.kind));

        if let (Some(leader), Some(leader_action)) = (leader, leader_action) {
            let suggested = directive_for(leader_action);
            debug!(leader, %leader_action, %suggested, "leader elected");
            for &follower in participants.iter().filter(|&&id| id != leader) {
                let directive = Message::to(
                    leader,
                    follower,
                    MessageBody::Directive {
                        leader,
                        leader_action,
                        suggested,
                    },
                    timestamp,
                )
                .with_priority(1);
                outcome.send(bus, directive);
            }
        }

        outcome.leader = leader;
        outcome.joint = proposals;
        outcome
    }
}

impl CoordinationOutcome {
    fn send(&mut self, bus: &mut MessageBus, message: Message) {
        if bus.deliver(message.clone()) {
            self.delivered += 1;
        }
        self.messages.push(message);
    }
}
