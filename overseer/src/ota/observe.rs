//! Observation records and the reasoning step that turns them into proposals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::GoalStatus;
use crate::findings::{Finding, MemorySummary};
use crate::ota::action::ActionKind;

pub const THOUGHT_CONFIDENCE: f64 = 0.8;

/// Recent findings carried into each observation.
pub const OBSERVED_FINDINGS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSnapshot {
    pub id: String,
    pub name: String,
    pub progress: f64,
    pub status: GoalStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub name: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    /// `ota_loop` for the loop's own observations.
    pub source: String,
    pub active_goals: Vec<GoalSnapshot>,
    pub pending_tasks: usize,
    /// Queued or running.
    pub running_tasks: usize,
    pub next_task: Option<TaskSnapshot>,
    pub memory: MemorySummary,
    pub recent_findings: Vec<Finding>,
}

impl Observation {
    /// Nothing active and nothing pending.
    pub fn is_idle(&self) -> bool {
        self.active_goals.is_empty() && self.pending_tasks == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub timestamp: DateTime<Utc>,
    pub reasoning: String,
    pub conclusions: Vec<String>,
    pub proposed: Vec<ActionKind>,
    pub confidence: f64,
}

/// Reason about an observation. `None` when there is nothing to reason about.
pub fn think(observation: &Observation, oracle_available: bool) -> Option<Thought> {
    let mut reasoning = Vec::new();
    let mut conclusions = Vec::new();
    let mut proposed = Vec::new();

    if let Some(task) = &observation.next_task {
        reasoning.push(format!("Found pending task: {}", task.name));
        conclusions.push("Should execute the next pending task".to_string());
        proposed.push(ActionKind::ExecuteTask {
            task_id: task.id.clone(),
            command: task.command.clone(),
        });
    }

    for goal in &observation.active_goals {
        if goal.progress < 50.0 {
            reasoning.push(format!("Goal '{}' needs more progress", goal.name));
        }
    }

    for finding in &observation.recent_findings {
        if finding.severity.is_urgent() {
            let head: String = finding.description.chars().take(50).collect();
            reasoning.push(format!("High-severity finding detected: {head}"));
            conclusions.push("May need to prioritize based on critical findings".to_string());
        }
    }

    if proposed.is_empty() && observation.pending_tasks == 0 && oracle_available {
        reasoning.push("No pending tasks, may need to generate more".to_string());
        proposed.push(ActionKind::RequestMoreTasks {
            goal_id: observation.active_goals.first().map(|g| g.id.clone()),
        });
    }

    if reasoning.is_empty() {
        return None;
    }
    Some(Thought {
        timestamp: Utc::now(),
        reasoning: reasoning.join(" | "),
        conclusions,
        proposed,
        confidence: THOUGHT_CONFIDENCE,
    })
}
