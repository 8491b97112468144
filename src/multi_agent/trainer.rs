use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::agent::{derive_seed, Agent};
use crate::config::{AgentConfig, TrainingConfig};
use crate::encoder::StateEncoder;
use crate::error::{PlutusError, Result};
use crate::export::ModelBlob;
use crate::multi_agent::communication::{Message, MessageBody, MessageBus, Recipient};
use crate::multi_agent::coordination::{CoordinationProtocol, Coordinator};
use crate::multi_agent::environment::{Environment, GameSnapshot, JointAction};
use crate::multi_agent::events::{EventBus, TrainingEvent};
use crate::multi_agent::reward::RewardCalculator;
use crate::types::{Action, AgentId, Experience, State};

/// What happened in one episode
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub steps: usize,
    /// Total reward per agent
    pub rewards: BTreeMap<AgentId, f32>,
    pub conflicts: usize,
    pub failed_actions: usize,
    /// The environment reported a terminal state
    pub terminal: bool,
    /// The stop flag ended the episode early
    pub stopped: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingReport {
    pub episodes: Vec<EpisodeSummary>,
    pub stopped: bool,
}

impl TrainingReport {
    pub fn total_steps(&self) -> usize {
        self.episodes.iter().map(|e| e.steps).sum()
    }

    /// Mean episode reward of `agent` over the whole run
    pub fn mean_reward(&self, agent: AgentId) -> Option<f32> {
        let rewards: Vec<f32> = self.episodes.iter().filter_map(|e| e.rewards.get(&agent).copied()).collect();
        if rewards.is_empty() {
            return None;
        }
        Some(rewards.iter().sum::<f32>() / rewards.len() as f32)
    }
}

/// Drives agents through episodes against one [`Environment`].
///
/// Per step: encode the board for every agent, let each agent drain its
/// inbox and pick an action, coordinate, step the environment, then hand
/// every agent its own experience. Episodes run strictly one after another.
///
/// The loop checks the stop flag from [`stop_handle`](Self::stop_handle)
/// before every step; the step ceiling from the config is the only other
/// bound.
pub struct TrainingOrchestrator<E: Environment> {
    env: E,
    config: TrainingConfig,
    agents: Vec<Agent>,
    encoder: StateEncoder,
    rewards: RewardCalculator,
    coordinator: Coordinator,
    bus: MessageBus,
    events: EventBus,
    stop: Arc<AtomicBool>,
    episodes_run: usize,
    clock: u64,
}

impl<E: Environment> TrainingOrchestrator<E> {
    pub fn new(env: E, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(TrainingOrchestrator {
            env,
            encoder: StateEncoder::new(config.encoder.clone()),
            rewards: RewardCalculator::new(config.reward.clone()),
            coordinator: Coordinator::new(config.coordination),
            config,
            agents: Vec::new(),
            bus: MessageBus::new(),
            events: EventBus::new(),
            stop: Arc::new(AtomicBool::new(false)),
            episodes_run: 0,
            clock: 0,
        })
    }

    /// Build an agent from `config` and register it. The agent's generator is
    /// seeded from the run's master seed and its id.
    pub fn add_agent(&mut self, config: AgentConfig) -> Result<AgentId> {
        let seed = derive_seed(self.config.seed, config.id);
        let agent = Agent::new(config, self.encoder.feature_count(), seed)?;
        self.insert_agent(agent)
    }

    /// Register an already built agent
    pub fn insert_agent(&mut self, agent: Agent) -> Result<AgentId> {
        let id = agent.id();
        if self.agent(id).is_some() {
            return Err(PlutusError::invalid_parameter("agent.id".to_string(), format!("agent {} already registered", id)));
        }
        self.env.add_agent(id, agent.agent_type())?;
        self.bus.register(id);
        self.agents.push(agent);
        info!(agent = id, total = self.agents.len(), "agent registered");
        Ok(id)
    }

    pub fn remove_agent(&mut self, id: AgentId) -> Result<Agent> {
        let index = self
            .agents
            .iter()
            .position(|a| a.id() == id)
            .ok_or(PlutusError::UnknownAgent(id))?;
        self.env.remove_agent(id)?;
        self.bus.unregister(id);
        info!(agent = id, "agent removed");
        Ok(self.agents.remove(index))
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id() == id)
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.id() == id)
    }

    /// Agents in registration order
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn episodes_run(&self) -> usize {
        self.episodes_run
    }

    pub fn message_bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn subscribe(&mut self) -> Receiver<TrainingEvent> {
        self.events.subscribe()
    }

    /// Flag that, once set, ends training before the next step
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn save_models(&self) -> BTreeMap<AgentId, ModelBlob> {
        self.agents.iter().map(|a| (a.id(), a.save_model())).collect()
    }

    pub fn load_models(&mut self, blobs: &BTreeMap<AgentId, ModelBlob>) -> Result<()> {
        for (&id, blob) in blobs {
            self.agent_mut(id).ok_or(PlutusError::UnknownAgent(id))?.load_model(blob)?;
        }
        Ok(())
    }

    /// Run up to `episodes` episodes, stopping early if the stop flag is set
    pub fn train(&mut self, episodes: usize) -> Result<TrainingReport> {
        if self.agents.is_empty() {
            return Err(PlutusError::invalid_parameter("agents", "no agents registered"));
        }
        info!(episodes, agents = self.agents.len(), protocol = ?self.config.coordination, "training started");

        let mut report = TrainingReport::default();
        for _ in 0..episodes {
            let summary = self.run_episode()?;
            let stopped = summary.stopped;
            report.episodes.push(summary);
            if stopped || self.stop.load(Ordering::Relaxed) {
                report.stopped = true;
                break;
            }
        }

        info!(
            episodes = report.episodes.len(),
            steps = report.total_steps(),
            stopped = report.stopped,
            "training finished"
        );
        Ok(report)
    }

    pub fn run_episode(&mut self) -> Result<EpisodeSummary> {
        let episode = self.episodes_run;
        self.events.publish(TrainingEvent::EpisodeStarted { episode });
        debug!(episode, "episode started");

        let mut snapshot = self.env.reset()?;
        let mut summary = EpisodeSummary {
            episode,
            rewards: self.agents.iter().map(|a| (a.id(), 0.0)).collect(),
            ..EpisodeSummary::default()
        };

        for step in 0..self.config.max_steps_per_episode {
            if self.stop.load(Ordering::Relaxed) {
                info!(episode, step, "stop requested");
                summary.stopped = true;
                self.events.publish(TrainingEvent::Stopped { episode, step });
                break;
            }
            let terminal = self.step(episode, step, &mut snapshot, &mut summary)?;
            summary.steps += 1;
            if terminal {
                summary.terminal = true;
                break;
            }
        }

        for agent in &mut self.agents {
            agent.complete_episode()?;
        }
        self.episodes_run += 1;

        let interval = self.config.strategy_share_interval;
        if interval > 0 && self.episodes_run % interval == 0 {
            self.share_strategies(episode);
        }
        let interval = self.config.exploration_adapt_interval;
        if interval > 0 && self.episodes_run % interval == 0 {
            self.adapt_exploration();
        }

        info!(
            episode,
            steps = summary.steps,
            conflicts = summary.conflicts,
            failed = summary.failed_actions,
            terminal = summary.terminal,
            "episode finished"
        );
        self.events.publish(TrainingEvent::EpisodeCompleted(summary.clone()));
        Ok(summary)
    }

    /// One step of the episode. Returns whether the environment reported a
    /// terminal state.
    fn step(&mut self, episode: usize, step: usize, snapshot: &mut GameSnapshot, summary: &mut EpisodeSummary) -> Result<bool> {
        self.clock += 1;

        let mut observations: Vec<(State, Vec<Action>)> = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let state = self.encoder.encode(snapshot, agent.id())?;
            let available = self.env.available_actions(&state);
            observations.push((state, available));
        }

        let mut proposals: JointAction = Vec::with_capacity(self.agents.len());
        for (agent, (state, available)) in self.agents.iter_mut().zip(&observations) {
            let inbox = self.bus.drain(agent.id());
            agent.process_messages(inbox);
            proposals.push((agent.id(), agent.select_action(state, available)?));
        }

        let neighbors = self.neighbor_map(snapshot);
        let coordinated = self
            .coordinator
            .coordinate(proposals, snapshot, &neighbors, &mut self.bus, self.clock);
        for conflict in &coordinated.conflicts {
            summary.conflicts += 1;
            if let Some(granted_to) = conflict.winner() {
                self.events.publish(TrainingEvent::ConflictResolved {
                    episode,
                    step,
                    resource: conflict.resource,
                    granted_to,
                    severity: conflict.severity,
                });
            }
        }
        self.forward_to_environment(&coordinated.messages);

        let outcome = self.env.step(&coordinated.joint)?;

        let mut step_total = 0.0;
        for ((agent, (state, _)), (_, action)) in self.agents.iter_mut().zip(observations).zip(coordinated.joint) {
            let id = agent.id();
            let result = outcome.results.get(&id);
            if let Some(failure) = result.filter(|r| !r.success) {
                let reason = failure.reason.clone().unwrap_or_default();
                warn!(agent = id, action = %action.kind, %reason, "action failed");
                summary.failed_actions += 1;
                self.events.publish(TrainingEvent::ActionFailed {
                    agent: id,
                    action: action.kind,
                    reason,
                });
            }

            let env_reward = outcome.rewards.get(&id).copied().unwrap_or(0.0);
            let reward = self.rewards.compute(id, snapshot, &outcome.snapshot, env_reward, result)?;
            let next_state = self.encoder.encode(&outcome.snapshot, id)?;
            let next_available = self.env.available_actions(&next_state);

            step_total += reward.total();
            *summary.rewards.entry(id).or_insert(0.0) += reward.total();

            let experience = Experience::new(state, action, reward, next_state, outcome.done);
            agent.update_experience(&experience, &next_available)?;
        }

        self.events.publish(TrainingEvent::StepCompleted {
            episode,
            step,
            total_reward: step_total,
        });
        *snapshot = outcome.snapshot;
        Ok(outcome.done)
    }

    /// Neighbour lists for the distributed protocol; empty otherwise
    fn neighbor_map(&self, snapshot: &GameSnapshot) -> BTreeMap<AgentId, Vec<AgentId>> {
        if self.coordinator.protocol() != CoordinationProtocol::Distributed {
            return BTreeMap::new();
        }
        self.agents
            .iter()
            .map(|agent| {
                let id = agent.id();
                let neighbors = self
                    .env
                    .agent_neighbors(id)
                    .unwrap_or_else(|| snapshot.neighbors(id, self.config.neighbor_distance));
                (id, neighbors)
            })
            .collect()
    }

    fn forward_to_environment(&mut self, messages: &[Message]) {
        for message in messages {
            match message.recipient {
                Recipient::Agent(_) => {
                    self.env.deliver_message(message);
                }
                Recipient::Broadcast => self.env.broadcast_message(message),
            }
        }
    }

    /// Cooperative agents send their best-action summary to every other
    /// cooperative agent
    fn share_strategies(&mut self, episode: usize) {
        let window = self.config.moving_average_window;
        let cooperative: Vec<AgentId> = self.agents.iter().filter(|a| a.is_cooperative()).map(|a| a.id()).collect();
        if cooperative.len() < 2 {
            return;
        }

        let mut sharers = Vec::new();
        let mut sent = Vec::new();
        for agent in self.agents.iter().filter(|a| a.is_cooperative()) {
            let Some(summary) = agent.strategy_summary(window) else { continue };
            sharers.push(agent.id());
            for &peer in cooperative.iter().filter(|&&peer| peer != agent.id()) {
                let message = Message::to(
                    agent.id(),
                    peer,
                    MessageBody::StrategyShare {
                        best_action: summary.best_action,
                        average_reward: summary.average_reward,
                        episodes: summary.episodes,
                    },
                    self.clock,
                );
                self.bus.deliver(message.clone());
                sent.push(message);
            }
        }
        self.forward_to_environment(&sent);

        debug!(episode, sharers = sharers.len(), messages = sent.len(), "strategies shared");
        if !sharers.is_empty() {
            self.events.publish(TrainingEvent::StrategiesShared { episode, sharers });
        }
    }

    /// Lower an agent's exploration when its moving-average reward improved
    /// since the last check, raise it otherwise, and clamp to the band
    fn adapt_exploration(&mut self) {
        let window = self.config.moving_average_window;
        let factor = self.config.adaptation_factor;
        let (min, max) = (self.config.exploration_min, self.config.exploration_max);

        for agent in &mut self.agents {
            let Some(improved) = agent.statistics_mut().check_improvement(window) else { continue };
            let previous = agent.exploration_rate();
            let nudged = if improved { previous / factor } else { previous * factor };
            let current = nudged.clamp(min, max);
            agent.set_exploration_rate(current);
            debug!(agent = agent.id(), previous, current, improved, "exploration adjusted");
            self.events.publish(TrainingEvent::ExplorationAdjusted {
                agent: agent.id(),
                previous,
                current,
                improved,
            });
        }
    }
}

impl<E: Environment> std::fmt::Debug for TrainingOrchestrator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingOrchestrator")
            .field("agents", &self.agents)
            .field("protocol", &self.config.coordination)
            .field("episodes_run", &self.episodes_run)
            .finish()
    }
}
