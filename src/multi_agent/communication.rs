use std::collections::{BTreeMap, VecDeque};

use serde::{Serialize, Deserialize};
use tracing::trace;

use crate::types::{ActionKind, AgentId, ResourceId};

/// Addressee of a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Agent(AgentId),
    Broadcast,
}

/// Message payloads, one variant per kind
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    /// A neighbour's intended action (distributed coordination)
    Information { intended: ActionKind, target: Option<ResourceId> },
    /// Suggestion from the elected leader (hierarchical coordination)
    Directive {
        leader: AgentId,
        leader_action: ActionKind,
        suggested: ActionKind,
    },
    /// Summary of a cooperative agent's best-performing action
    StrategyShare {
        best_action: ActionKind,
        average_reward: f32,
        episodes: usize,
    },
    /// Notice that a contested resource went to another agent
    ConflictNotice { resource: ResourceId, granted_to: AgentId },
}

/// An immutable message between agents
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: AgentId,
    pub recipient: Recipient,
    pub body: MessageBody,
    pub timestamp: u64,
    pub priority: u8,
}

impl Message {
    pub fn to(sender: AgentId, recipient: AgentId, body: MessageBody, timestamp: u64) -> Self {
        Message {
            sender,
            recipient: Recipient::Agent(recipient),
            body,
            timestamp,
            priority: 0,
        }
    }

    pub fn broadcast(sender: AgentId, body: MessageBody, timestamp: u64) -> Self {
        Message {
            sender,
            recipient: Recipient::Broadcast,
            body,
            timestamp,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// Per-receiver message queues.
///
/// Messages from one sender to one receiver stay in send order; nothing is
/// promised about interleaving between different senders.
#[derive(Debug, Default)]
pub struct MessageBus {
    queues: BTreeMap<AgentId, VecDeque<Message>>,
    delivered: u64,
    dropped: u64,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: AgentId) {
        self.queues.entry(agent).or_default();
    }

    /// Remove an agent and discard anything still queued for it
    pub fn unregister(&mut self, agent: AgentId) {
        self.queues.remove(&agent);
    }

    pub fn is_registered(&self, agent: AgentId) -> bool {
        self.queues.contains_key(&agent)
    }

    /// Route a message. Point-to-point messages to unknown receivers are
    /// dropped and reported with `false`; broadcasts succeed if they reach
    /// anyone.
    pub fn deliver(&mut self, message: Message) -> bool {
        match message.recipient {
            Recipient::Agent(receiver) => match self.queues.get_mut(&receiver) {
                Some(queue) => {
                    queue.push_back(message);
                    self.delivered += 1;
                    true
                }
                None => {
                    trace!(sender = message.sender, receiver, "dropping message to unknown agent");
                    self.dropped += 1;
                    false
                }
            },
            Recipient::Broadcast => self.broadcast(message) > 0,
        }
    }

    /// Copy a message into every queue except the sender's. Returns how many
    /// agents received it.
    pub fn broadcast(&mut self, message: Message) -> usize {
        let mut count = 0;
        for (&agent, queue) in self.queues.iter_mut() {
            if agent != message.sender {
                queue.push_back(message.clone());
                count += 1;
            }
        }
        self.delivered += count as u64;
        count
    }

    /// Take everything queued for `agent`, oldest first
    pub fn drain(&mut self, agent: AgentId) -> Vec<Message> {
        self.queues
            .get_mut(&agent)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn pending(&self, agent: AgentId) -> usize {
        self.queues.get(&agent).map_or(0, VecDeque::len)
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        for queue in self.queues.values_mut() {
            queue.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(kind: ActionKind) -> MessageBody {
        MessageBody::Information {
            intended: kind,
            target: None,
        }
    }

    #[test]
    fn test_deliver_to_unknown_agent_fails_softly() {
        let mut bus = MessageBus::new();
        bus.register(0);
        assert!(!bus.deliver(Message::to(0, 5, info(ActionKind::Pass), 1)));
        assert_eq!(bus.dropped_count(), 1);
        assert_eq!(bus.pending(0), 0);
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let mut bus = MessageBus::new();
        for id in 0..3 {
            bus.register(id);
        }
        let reached = bus.broadcast(Message::broadcast(1, info(ActionKind::Trade), 2));
        assert_eq!(reached, 2);
        assert_eq!(bus.pending(0), 1);
        assert_eq!(bus.pending(1), 0);
        assert_eq!(bus.pending(2), 1);
    }

    #[test]
    fn test_drain_is_fifo_per_sender() {
        let mut bus = MessageBus::new();
        bus.register(0);
        bus.register(1);
        bus.deliver(Message::to(1, 0, info(ActionKind::BuyProperty), 1));
        bus.deliver(Message::to(1, 0, info(ActionKind::Invest), 2));

        let drained = bus.drain(0);
        let stamps: Vec<u64> = drained.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![1, 2]);
        assert!(bus.drain(0).is_empty());
    }

    #[test]
    fn test_unregister_drops_queue() {
        let mut bus = MessageBus::new();
        bus.register(3);
        bus.deliver(Message::to(0, 3, info(ActionKind::Pass), 1));
        bus.unregister(3);
        assert!(!bus.is_registered(3));
        assert!(bus.drain(3).is_empty());
    }
}
