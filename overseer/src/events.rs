//! Typed event bus shared by all components.
//!
//! Publishing is a non-blocking broadcast send, so it is safe to publish from
//! inside a component's guarded section: observers run on their own tasks and
//! can never re-enter the publisher or fail it.

use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::Result;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::policy::ActionClass;
use crate::core::types::{AgentId, AgentStatus, QueueStatus};

/// One variant per event the orchestration core emits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    GoalCreated { goal_id: String, parent_id: Option<String> },
    GoalStarted { goal_id: String },
    GoalCompleted { goal_id: String },
    GoalFailed { goal_id: String },
    GoalUpdated { goal_id: String, progress: f64 },
    MilestoneReached { goal_id: String },

    PlanCreated { plan_id: String, goal_id: String, tasks: usize },
    PlanCompleted { plan_id: String },
    PhaseCompleted { plan_id: String, phase: u32 },
    TaskCreated { task_id: String, goal_id: String },
    TaskStarted { task_id: String, agent_id: AgentId },
    TaskCompleted { task_id: String },
    TaskRetrying { task_id: String, retry_count: u32 },
    TaskFailed { task_id: String, retry_count: u32 },

    QueueItemAdded { index: u64 },
    QueueItemUpdated { index: u64, status: QueueStatus },
    QueueItemRemoved { index: u64 },
    QueueCleared,

    AgentAdded { agent_id: AgentId },
    AgentRemoved { agent_id: AgentId },
    AgentUpdated { agent_id: AgentId },
    AgentStatusChanged { agent_id: AgentId, status: AgentStatus },

    LoopIteration { count: u32 },
    Observed { pending_tasks: usize, active_goals: usize },
    Thought { reasoning: String, proposed: usize },
    ActionProposed { action_id: String, class: ActionClass },
    ApprovalRequired { action_id: String, class: ActionClass },
    ActionExecuted { action_id: String },
    ActionRejected { action_id: String },
    LoopError { message: String },

    SessionStarted { target: String, goal_id: String, plan_id: String },
    SessionPaused,
    SessionResumed,
    SessionStopped,
    SessionCompleted { findings: usize },
    FindingRecorded { title: String, agent_id: AgentId },
    Error { message: String },
}

/// Broadcast bus for [`Event`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per lagging receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        debug!(?event, "publish event");
        if self.sender.send(event).is_err() {
            debug!("no subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Run `callback` for every event on a background task.
    ///
    /// Errors and panics raised by the callback are logged and swallowed; the
    /// observer keeps receiving. The task ends when every sender is dropped.
    /// Must be called from within a tokio runtime.
    pub fn observe<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(&Event) -> Result<()> + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => warn!(error = %err, ?event, "event observer failed"),
                        Err(_) => warn!(?event, "event observer panicked"),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event observer lagged, some events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.publish(Event::QueueCleared);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::QueueItemAdded { index: 1 });
        bus.publish(Event::QueueItemRemoved { index: 1 });
        assert_eq!(rx.try_recv().expect("first"), Event::QueueItemAdded { index: 1 });
        assert_eq!(rx.try_recv().expect("second"), Event::QueueItemRemoved { index: 1 });
    }

    #[tokio::test]
    async fn misbehaving_observer_keeps_running() {
        let bus = EventBus::new(8);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let handle = bus.observe(move |event| {
            counter.fetch_add(1, Ordering::SeqCst);
            match event {
                Event::QueueCleared => panic!("observer bug"),
                Event::SessionStopped => Err(anyhow::anyhow!("observer error")),
                _ => Ok(()),
            }
        });

        bus.publish(Event::QueueCleared);
        bus.publish(Event::SessionStopped);
        bus.publish(Event::SessionPaused);

        for _ in 0..50 {
            if seen.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        drop(bus);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("observer exits once the bus is dropped")
            .expect("join");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(Event::TaskFailed {
            task_id: "task_1".to_string(),
            retry_count: 3,
        })
        .expect("json");
        assert_eq!(json["type"], "task_failed");
        assert_eq!(json["retry_count"], 3);
    }
}
