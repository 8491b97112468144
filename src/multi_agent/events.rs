use std::sync::mpsc::{self, Receiver, Sender};

use crate::multi_agent::trainer::EpisodeSummary;
use crate::types::{ActionKind, AgentId, ResourceId};

/// Everything the orchestrator reports while training
#[derive(Clone, Debug, PartialEq)]
pub enum TrainingEvent {
    EpisodeStarted {
        episode: usize,
    },
    StepCompleted {
        episode: usize,
        step: usize,
        /// Sum of all agents' rewards this step
        total_reward: f32,
    },
    ConflictResolved {
        episode: usize,
        step: usize,
        resource: ResourceId,
        granted_to: AgentId,
        severity: usize,
    },
    ActionFailed {
        agent: AgentId,
        action: ActionKind,
        reason: String,
    },
    StrategiesShared {
        episode: usize,
        sharers: Vec<AgentId>,
    },
    ExplorationAdjusted {
        agent: AgentId,
        previous: f32,
        current: f32,
        improved: bool,
    },
    EpisodeCompleted(EpisodeSummary),
    /// The stop flag was raised; no further steps run
    Stopped {
        episode: usize,
        step: usize,
    },
}

/// Typed fan-out of [`TrainingEvent`]s. Every subscriber gets its own copy;
/// subscribers whose receiver was dropped are forgotten on the next publish.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<TrainingEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<TrainingEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish(&mut self, event: TrainingEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives_events() {
        let mut bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();
        bus.publish(TrainingEvent::EpisodeStarted { episode: 3 });

        assert_eq!(first.try_recv().unwrap(), TrainingEvent::EpisodeStarted { episode: 3 });
        assert_eq!(second.try_recv().unwrap(), TrainingEvent::EpisodeStarted { episode: 3 });
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(TrainingEvent::Stopped { episode: 0, step: 1 });
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
