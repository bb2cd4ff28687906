use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::policy::ActionClass;

/// What a proposed action does, with only the fields it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    ExecuteTask { task_id: String, command: String },
    /// Ask the oracle for follow-up work for a goal (first active goal when unset).
    RequestMoreTasks { goal_id: Option<String> },
}

impl ActionKind {
    pub fn class(&self) -> ActionClass {
        match self {
            ActionKind::ExecuteTask { .. } => ActionClass::TaskExecution,
            ActionKind::RequestMoreTasks { .. } => ActionClass::Planning,
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            ActionKind::ExecuteTask { command, .. } => Some(command),
            ActionKind::RequestMoreTasks { .. } => None,
        }
    }

    /// Two actions with the same key are the same request.
    pub(crate) fn same_request(&self, other: &ActionKind) -> bool {
        match (self, other) {
            (
                ActionKind::ExecuteTask { task_id: a, .. },
                ActionKind::ExecuteTask { task_id: b, .. },
            ) => a == b,
            (ActionKind::RequestMoreTasks { .. }, ActionKind::RequestMoreTasks { .. }) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    TaskExecuted { task_id: String, exit_code: i32, success: bool },
    NoExecutor { command: String },
    /// The task was already claimed elsewhere or is no longer pending.
    TaskUnavailable { task_id: String },
    TasksAdded { count: usize },
    NoNewWork,
    SessionEnded { tasks_added: usize },
    NoOracle,
    NoActiveGoal,
    Error { message: String },
}

impl ActionResult {
    pub fn is_error(&self) -> bool {
        matches!(self, ActionResult::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    pub requires_approval: bool,
    pub approved: bool,
    pub executed: bool,
    pub result: Option<ActionResult>,
    pub proposed_at: DateTime<Utc>,
}

impl Action {
    pub fn new(id: String, kind: ActionKind, requires_approval: bool) -> Self {
        Self {
            id,
            kind,
            requires_approval,
            approved: !requires_approval,
            executed: false,
            result: None,
            proposed_at: Utc::now(),
        }
    }
}
