//! Bounded pool of worker identities and their counters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{AgentId, AgentStatus};
use crate::events::{Event, EventBus};

pub const DEFAULT_MAX_AGENTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub current_task: String,
    pub started_at: DateTime<Utc>,
    pub last_execute: DateTime<Utc>,
    pub memory_usage: f64,
    pub cpu_usage: f64,
    pub network_usage: f64,
    pub tasks_done: u64,
    pub tasks_failed: u64,
}

impl Agent {
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub total_agents: usize,
    pub idle_agents: usize,
    pub running_agents: usize,
    pub max_agents: usize,
    pub total_tasks_done: u64,
    pub total_tasks_failed: u64,
}

#[derive(Debug)]
struct RegistryState {
    agents: BTreeMap<AgentId, Agent>,
    next_id: AgentId,
}

pub struct AgentRegistry {
    state: Mutex<RegistryState>,
    max_agents: usize,
    events: EventBus,
}

impl AgentRegistry {
    pub fn new(max_agents: usize, events: EventBus) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                agents: BTreeMap::new(),
                next_id: 1,
            }),
            max_agents,
            events,
        }
    }

    pub fn max_agents(&self) -> usize {
        self.max_agents
    }

    /// Allocate a fresh agent. `None` once `max_agents` are registered.
    pub fn add_agent(&self, name: &str) -> Option<Agent> {
        let mut state = self.state.lock();
        if state.agents.len() >= self.max_agents {
            debug!(max = self.max_agents, "agent cap reached");
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        let now = Utc::now();
        let agent = Agent {
            id,
            name: name.to_string(),
            status: AgentStatus::Idle,
            current_task: String::new(),
            started_at: now,
            last_execute: now,
            memory_usage: 0.0,
            cpu_usage: 0.0,
            network_usage: 0.0,
            tasks_done: 0,
            tasks_failed: 0,
        };
        state.agents.insert(id, agent.clone());
        self.events.publish(Event::AgentAdded { agent_id: id });
        Some(agent)
    }

    pub fn remove_agent(&self, agent_id: AgentId) -> bool {
        let removed = self.state.lock().agents.remove(&agent_id).is_some();
        if removed {
            self.events.publish(Event::AgentRemoved { agent_id });
        }
        removed
    }

    pub fn get(&self, agent_id: AgentId) -> Option<Agent> {
        self.state.lock().agents.get(&agent_id).cloned()
    }

    pub fn all(&self) -> Vec<Agent> {
        self.state.lock().agents.values().cloned().collect()
    }

    pub fn idle_agent(&self) -> Option<Agent> {
        self.state
            .lock()
            .agents
            .values()
            .find(|a| a.status == AgentStatus::Idle)
            .cloned()
    }

    /// Set status and current task label. Status-change events fire only on a real change.
    pub fn update_status(&self, agent_id: AgentId, status: AgentStatus, task: &str) -> bool {
        let mut state = self.state.lock();
        let Some(agent) = state.agents.get_mut(&agent_id) else {
            return false;
        };
        let changed = agent.status != status;
        agent.status = status;
        agent.current_task = task.to_string();
        agent.last_execute = Utc::now();
        drop(state);

        if changed {
            self.events.publish(Event::AgentStatusChanged { agent_id, status });
        }
        self.events.publish(Event::AgentUpdated { agent_id });
        true
    }

    pub fn update_metrics(&self, agent_id: AgentId, memory: f64, cpu: f64, network: f64) -> bool {
        let mut state = self.state.lock();
        let Some(agent) = state.agents.get_mut(&agent_id) else {
            return false;
        };
        agent.memory_usage = memory;
        agent.cpu_usage = cpu;
        agent.network_usage = network;
        drop(state);
        self.events.publish(Event::AgentUpdated { agent_id });
        true
    }

    pub fn increment_task_count(&self, agent_id: AgentId, success: bool) -> bool {
        let mut state = self.state.lock();
        let Some(agent) = state.agents.get_mut(&agent_id) else {
            return false;
        };
        if success {
            agent.tasks_done += 1;
        } else {
            agent.tasks_failed += 1;
        }
        drop(state);
        self.events.publish(Event::AgentUpdated { agent_id });
        true
    }

    pub fn summary(&self) -> AgentSummary {
        let state = self.state.lock();
        let count = |status: AgentStatus| {
            state.agents.values().filter(|a| a.status == status).count()
        };
        AgentSummary {
            total_agents: state.agents.len(),
            idle_agents: count(AgentStatus::Idle),
            running_agents: count(AgentStatus::Running),
            max_agents: self.max_agents,
            total_tasks_done: state.agents.values().map(|a| a.tasks_done).sum(),
            total_tasks_failed: state.agents.values().map(|a| a.tasks_failed).sum(),
        }
    }
}
