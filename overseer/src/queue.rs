//! FIFO command queue handing work to agent workers.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::commands::{CommandBatch, ordered_commands};
use crate::core::queue_protocol::{QueueCommand, parse_queue_command};
use crate::core::types::{AgentId, QueueStatus};
use crate::events::{Event, EventBus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub index: u64,
    pub command: String,
    pub status: QueueStatus,
    pub output: String,
    pub error: String,
    pub agent_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Seconds from claim to completion, once both are stamped.
    pub fn duration_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        Some((completed - started).num_milliseconds() as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Outcome fields applied by [`QueueManager::update_item`].
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub output: Option<String>,
    pub error: Option<String>,
    pub agent_id: Option<AgentId>,
}

#[derive(Debug, Default)]
struct QueueState {
    items: Vec<QueueItem>,
    next_index: u64,
}

impl QueueState {
    fn push(&mut self, command: &str) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.items.push(QueueItem {
            index,
            command: command.to_string(),
            status: QueueStatus::Pending,
            output: String::new(),
            error: String::new(),
            agent_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        });
        index
    }

    fn count(&self, status: QueueStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

pub struct QueueManager {
    state: Mutex<QueueState>,
    events: EventBus,
}

impl QueueManager {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: Vec::new(),
                next_index: 1,
            }),
            events,
        }
    }

    /// Enqueue a batch in ascending numeric key order. Returns the new indices.
    pub fn add_commands(&self, commands: &CommandBatch) -> Vec<u64> {
        let mut state = self.state.lock();
        let indices: Vec<u64> = ordered_commands(commands)
            .into_iter()
            .map(|(_, command)| state.push(command))
            .collect();
        drop(state);
        for index in &indices {
            self.events.publish(Event::QueueItemAdded { index: *index });
        }
        debug!(count = indices.len(), "commands queued");
        indices
    }

    pub fn add_single(&self, command: &str) -> u64 {
        let index = self.state.lock().push(command);
        self.events.publish(Event::QueueItemAdded { index });
        index
    }

    /// Remove an item by index regardless of its status.
    pub fn remove(&self, index: u64) -> bool {
        let mut state = self.state.lock();
        let before = state.items.len();
        state.items.retain(|item| item.index != index);
        let removed = state.items.len() != before;
        drop(state);
        if removed {
            self.events.publish(Event::QueueItemRemoved { index });
        }
        removed
    }

    /// Claim the first pending item: it becomes running with a start time.
    ///
    /// The check and the transition happen under one lock, so an item is
    /// handed to at most one caller.
    pub fn get_next_pending(&self) -> Option<QueueItem> {
        let mut state = self.state.lock();
        let item = state
            .items
            .iter_mut()
            .find(|item| item.status == QueueStatus::Pending)?;
        item.status = QueueStatus::Running;
        item.started_at = Some(Utc::now());
        let claimed = item.clone();
        drop(state);
        self.events.publish(Event::QueueItemUpdated {
            index: claimed.index,
            status: QueueStatus::Running,
        });
        Some(claimed)
    }

    /// Move an item forward to `status`.
    ///
    /// Backward or repeated transitions are refused and return false.
    pub fn update_item(&self, index: u64, status: QueueStatus, update: ItemUpdate) -> bool {
        let mut state = self.state.lock();
        let Some(item) = state.items.iter_mut().find(|item| item.index == index) else {
            return false;
        };
        if !item.status.can_transition_to(status) {
            warn!(index, from = %item.status, to = %status, "rejected queue transition");
            return false;
        }
        item.status = status;
        if status == QueueStatus::Running && item.started_at.is_none() {
            item.started_at = Some(Utc::now());
        }
        if status.is_terminal() {
            item.completed_at = Some(Utc::now());
        }
        if let Some(output) = update.output {
            item.output = output;
        }
        if let Some(error) = update.error {
            item.error = error;
        }
        if update.agent_id.is_some() {
            item.agent_id = update.agent_id;
        }
        drop(state);
        self.events.publish(Event::QueueItemUpdated { index, status });
        true
    }

    pub fn get(&self, index: u64) -> Option<QueueItem> {
        self.state
            .lock()
            .items
            .iter()
            .find(|item| item.index == index)
            .cloned()
    }

    pub fn all(&self) -> Vec<QueueItem> {
        self.state.lock().items.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().count(QueueStatus::Pending)
    }

    pub fn running_count(&self) -> usize {
        self.state.lock().count(QueueStatus::Running)
    }

    /// Completed plus failed items still held.
    pub fn finished_count(&self) -> usize {
        let state = self.state.lock();
        state.items.iter().filter(|item| item.status.is_terminal()).count()
    }

    pub fn summary(&self) -> QueueSummary {
        let state = self.state.lock();
        QueueSummary {
            total: state.items.len(),
            pending: state.count(QueueStatus::Pending),
            running: state.count(QueueStatus::Running),
            completed: state.count(QueueStatus::Completed),
            failed: state.count(QueueStatus::Failed),
        }
    }

    pub fn clear(&self) {
        self.state.lock().items.clear();
        self.events.publish(Event::QueueCleared);
    }

    /// Drop completed and failed items. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.items.len();
        state.items.retain(|item| !item.status.is_terminal());
        before - state.items.len()
    }

    /// Execute one line of the queue text protocol and describe the result.
    pub fn handle_text_command(&self, line: &str) -> String {
        match parse_queue_command(line) {
            Ok(QueueCommand::List) => {
                let items = self.all();
                if items.is_empty() {
                    return "Queue is empty".to_string();
                }
                items
                    .iter()
                    .map(|item| format!("{}: {} [{}]", item.index, item.command, item.status))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Ok(QueueCommand::Remove(index)) => {
                if self.remove(index) {
                    format!("Removed item {index}")
                } else {
                    format!("Item {index} not found")
                }
            }
            Ok(QueueCommand::Add(batch)) => {
                let added = self.add_commands(&batch);
                format!("Added {} commands to queue", added.len())
            }
            Ok(QueueCommand::Clear) => {
                self.clear();
                "Queue cleared".to_string()
            }
            Err(err) => err.to_string(),
        }
    }
}
