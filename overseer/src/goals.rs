//! Goal forest with dependencies, priorities and success criteria.
//!
//! Tree edges (`parent_id`/`children`) drive progress aggregation; dependency
//! edges form a separate DAG that gates `start_goal` and `next_goal`.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::selector::{Schedulable, first_ready};
use crate::core::types::{GoalPriority, GoalStatus, GoalType, MetricKind, ScanMode};
use crate::events::{Event, EventBus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriteria {
    pub description: String,
    pub metric: MetricKind,
    pub target_value: Option<f64>,
    pub current_value: f64,
    pub met: bool,
}

impl SuccessCriteria {
    pub fn new(
        description: impl Into<String>,
        metric: MetricKind,
        target_value: Option<f64>,
    ) -> Self {
        Self {
            description: description.into(),
            metric,
            target_value,
            current_value: 0.0,
            met: false,
        }
    }

    /// Record `value` and recompute `met` for this metric kind.
    pub fn evaluate(&mut self, value: f64) -> bool {
        self.current_value = value;
        self.met = match self.metric {
            MetricKind::Threshold => value >= self.target_value.unwrap_or(0.0),
            MetricKind::Boolean => value > 0.0,
            MetricKind::Count => value >= self.target_value.unwrap_or(1.0),
        };
        self.met
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub description: String,
    pub goal_type: GoalType,
    pub priority: GoalPriority,
    pub status: GoalStatus,
    pub parent_id: Option<String>,
    pub children: Vec<String>,
    pub dependencies: Vec<String>,
    pub success_criteria: Vec<SuccessCriteria>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: f64,
    pub findings: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    #[serde(skip)]
    seq: u64,
    #[serde(skip)]
    milestone_reached: bool,
}

impl Goal {
    /// Own criteria all met, or progress at 100 when there are none.
    pub fn evaluate_success(&self) -> bool {
        if self.success_criteria.is_empty() {
            return self.progress >= 100.0;
        }
        self.success_criteria.iter().all(|c| c.met)
    }

    /// Seconds between start and completion (or now, while still open).
    pub fn duration_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds() as f64 / 1000.0)
    }

    pub fn target(&self) -> Option<&str> {
        self.metadata.get("target").map(String::as_str)
    }

    pub fn mode(&self) -> ScanMode {
        self.metadata
            .get("mode")
            .and_then(|m| m.parse().ok())
            .unwrap_or_default()
    }
}

impl Schedulable for Goal {
    type Priority = GoalPriority;

    fn priority(&self) -> GoalPriority {
        self.priority
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn seq(&self) -> u64 {
        self.seq
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

/// Parameters for [`GoalSystem::create_goal`].
#[derive(Debug, Clone)]
pub struct NewGoal {
    pub name: String,
    pub description: String,
    pub goal_type: GoalType,
    pub priority: GoalPriority,
    pub parent_id: Option<String>,
    pub dependencies: Vec<String>,
    pub success_criteria: Vec<SuccessCriteria>,
    pub metadata: BTreeMap<String, String>,
}

impl NewGoal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            goal_type: GoalType::ShortTerm,
            priority: GoalPriority::Medium,
            parent_id: None,
            dependencies: Vec::new(),
            success_criteria: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub success_rate: f64,
    pub active_goals: usize,
}

#[derive(Debug, Default)]
struct GoalState {
    goals: HashMap<String, Goal>,
    active: Vec<String>,
    history: Vec<String>,
    next_id: u64,
}

impl GoalState {
    fn is_completed(&self, goal_id: &str) -> bool {
        self.goals
            .get(goal_id)
            .is_some_and(|g| g.status == GoalStatus::Completed)
    }

    fn children_mean_progress(&self, goal: &Goal) -> Option<f64> {
        if goal.children.is_empty() {
            return None;
        }
        let total: f64 = goal
            .children
            .iter()
            .filter_map(|id| self.goals.get(id))
            .map(|child| child.progress)
            .sum();
        Some(total / goal.children.len() as f64)
    }
}

/// Owner of every goal in a session.
pub struct GoalSystem {
    state: Mutex<GoalState>,
    events: EventBus,
}

impl GoalSystem {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Mutex::new(GoalState {
                next_id: 1,
                ..GoalState::default()
            }),
            events,
        }
    }

    /// Create a goal, linking it under its parent when the parent exists.
    pub fn create_goal(&self, draft: NewGoal) -> Goal {
        let mut state = self.state.lock();
        let seq = state.next_id;
        state.next_id += 1;
        let id = format!("goal_{seq}");

        let goal = Goal {
            id: id.clone(),
            name: draft.name,
            description: draft.description,
            goal_type: draft.goal_type,
            priority: draft.priority,
            status: GoalStatus::Pending,
            parent_id: draft.parent_id.clone(),
            children: Vec::new(),
            dependencies: draft.dependencies,
            success_criteria: draft.success_criteria,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0.0,
            findings: Vec::new(),
            metadata: draft.metadata,
            seq,
            milestone_reached: false,
        };

        if let Some(parent_id) = &draft.parent_id {
            match state.goals.get_mut(parent_id) {
                Some(parent) => parent.children.push(id.clone()),
                None => warn!(goal_id = %id, parent_id = %parent_id, "parent goal not found"),
            }
        }
        state.goals.insert(id.clone(), goal.clone());
        debug!(goal_id = %id, "goal created");
        self.events.publish(Event::GoalCreated {
            goal_id: id,
            parent_id: draft.parent_id,
        });
        goal
    }

    /// Root goal for a reconnaissance session against `target`.
    pub fn create_from_objective(&self, objective: &str, target: &str, mode: ScanMode) -> Goal {
        let mut draft = NewGoal::new(format!("Analyze {target}"));
        draft.description = objective.to_string();
        draft.goal_type = GoalType::LongTerm;
        draft.priority = GoalPriority::High;
        draft.success_criteria = vec![
            SuccessCriteria::new("Complete all reconnaissance tasks", MetricKind::Boolean, None),
            SuccessCriteria::new("Collect findings", MetricKind::Count, Some(1.0)),
        ];
        draft.metadata = BTreeMap::from([
            ("target".to_string(), target.to_string()),
            ("mode".to_string(), mode.to_string()),
            ("objective".to_string(), objective.to_string()),
        ]);
        self.create_goal(draft)
    }

    /// Move a goal to in-progress. Returns false if any dependency is not completed.
    pub fn start_goal(&self, goal_id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(goal) = state.goals.get(goal_id) else {
            return false;
        };
        if goal.status.is_terminal() {
            return false;
        }
        let blocked = goal
            .dependencies
            .iter()
            .find(|dep| !state.is_completed(dep))
            .cloned();
        if let Some(dep) = blocked {
            debug!(goal_id, dependency = %dep, "goal start rejected, dependency incomplete");
            return false;
        }

        if let Some(goal) = state.goals.get_mut(goal_id) {
            goal.status = GoalStatus::InProgress;
            goal.started_at = Some(Utc::now());
        }
        if !state.active.iter().any(|id| id == goal_id) {
            state.active.push(goal_id.to_string());
        }
        info!(goal_id, "goal started");
        self.events.publish(Event::GoalStarted {
            goal_id: goal_id.to_string(),
        });
        true
    }

    /// Mark a goal completed (or failed) and propagate progress to its ancestors.
    pub fn complete_goal(&self, goal_id: &str, success: bool) -> bool {
        let mut state = self.state.lock();
        let parent_id = match state.goals.get_mut(goal_id) {
            Some(goal) if !goal.status.is_terminal() => {
                goal.status = if success {
                    GoalStatus::Completed
                } else {
                    GoalStatus::Failed
                };
                goal.completed_at = Some(Utc::now());
                if success {
                    goal.progress = 100.0;
                }
                goal.parent_id.clone()
            }
            _ => return false,
        };

        state.active.retain(|id| id != goal_id);
        state.history.push(goal_id.to_string());
        info!(goal_id, success, "goal finished");
        let goal_id = goal_id.to_string();
        self.events.publish(if success {
            Event::GoalCompleted { goal_id }
        } else {
            Event::GoalFailed { goal_id }
        });

        if let Some(parent_id) = parent_id {
            self.propagate_progress(&mut state, &parent_id);
        }
        true
    }

    /// Set progress (clamped to [0, 100]) and refresh every ancestor.
    ///
    /// Finished goals keep their final progress.
    pub fn update_progress(&self, goal_id: &str, progress: f64) -> bool {
        let mut state = self.state.lock();
        let Some(goal) = state.goals.get_mut(goal_id) else {
            return false;
        };
        if goal.status.is_terminal() {
            debug!(goal_id, "progress update ignored, goal finished");
            return false;
        }
        goal.progress = progress.clamp(0.0, 100.0);
        let progress = goal.progress;
        let parent_id = goal.parent_id.clone();
        self.events.publish(Event::GoalUpdated {
            goal_id: goal_id.to_string(),
            progress,
        });
        if let Some(parent_id) = parent_id {
            self.propagate_progress(&mut state, &parent_id);
        }
        true
    }

    /// Append a finding and re-evaluate count criteria with the new total.
    pub fn add_finding(&self, goal_id: &str, finding: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        let Some(goal) = state.goals.get_mut(goal_id) else {
            return false;
        };
        goal.findings.push(finding.into());
        if goal.status.is_terminal() {
            return true;
        }
        let count = goal.findings.len() as f64;
        for criteria in &mut goal.success_criteria {
            if criteria.metric == MetricKind::Count {
                criteria.evaluate(count);
            }
        }
        true
    }

    /// Evaluate every criterion of `kind` with `value`. No-op on finished goals.
    pub fn record_metric(&self, goal_id: &str, kind: MetricKind, value: f64) -> bool {
        let mut state = self.state.lock();
        let Some(goal) = state.goals.get_mut(goal_id) else {
            return false;
        };
        if goal.status.is_terminal() {
            return false;
        }
        let mut touched = false;
        for criteria in &mut goal.success_criteria {
            if criteria.metric == kind {
                criteria.evaluate(value);
                touched = true;
            }
        }
        touched
    }

    /// Whether a goal has met its success condition.
    ///
    /// Goals with children first refresh their progress from the children.
    pub fn evaluate_goal(&self, goal_id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(goal) = state.goals.get(goal_id) else {
            return false;
        };
        if let Some(mean) = state.children_mean_progress(goal)
            && let Some(goal) = state.goals.get_mut(goal_id)
        {
            goal.progress = mean.clamp(0.0, 100.0);
        }
        state
            .goals
            .get(goal_id)
            .is_some_and(Goal::evaluate_success)
    }

    /// Highest-priority, earliest-created pending goal whose dependencies are complete.
    pub fn next_goal(&self) -> Option<Goal> {
        let state = self.state.lock();
        let pending: Vec<&Goal> = state
            .goals
            .values()
            .filter(|g| g.status == GoalStatus::Pending)
            .collect();
        first_ready(pending, |dep| state.is_completed(dep)).cloned()
    }

    pub fn get_goal(&self, goal_id: &str) -> Option<Goal> {
        self.state.lock().goals.get(goal_id).cloned()
    }

    pub fn active_goals(&self) -> Vec<Goal> {
        let state = self.state.lock();
        state
            .active
            .iter()
            .filter_map(|id| state.goals.get(id))
            .cloned()
            .collect()
    }

    pub fn pending_goals(&self) -> Vec<Goal> {
        self.sorted_where(|g| g.status == GoalStatus::Pending)
    }

    pub fn goals_by_type(&self, goal_type: GoalType) -> Vec<Goal> {
        self.sorted_where(|g| g.goal_type == goal_type)
    }

    /// Ids of finished goals in completion order.
    pub fn history(&self) -> Vec<String> {
        self.state.lock().history.clone()
    }

    /// Every goal keyed by id.
    pub fn snapshot(&self) -> BTreeMap<String, Goal> {
        self.state
            .lock()
            .goals
            .iter()
            .map(|(id, goal)| (id.clone(), goal.clone()))
            .collect()
    }

    pub fn summary(&self) -> GoalSummary {
        let state = self.state.lock();
        let count = |status: GoalStatus| {
            state.goals.values().filter(|g| g.status == status).count()
        };
        let total = state.goals.len();
        let completed = count(GoalStatus::Completed);
        GoalSummary {
            total,
            completed,
            failed: count(GoalStatus::Failed),
            in_progress: count(GoalStatus::InProgress),
            pending: count(GoalStatus::Pending),
            success_rate: if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            active_goals: state.active.len(),
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.goals.clear();
        state.active.clear();
        state.history.clear();
    }

    fn sorted_where<F: Fn(&Goal) -> bool>(&self, predicate: F) -> Vec<Goal> {
        let state = self.state.lock();
        let mut goals: Vec<Goal> = state.goals.values().filter(|g| predicate(g)).cloned().collect();
        goals.sort_by_key(|g| g.seq);
        goals
    }

    /// Recompute `goal_id` and each ancestor as the mean of its children.
    fn propagate_progress(&self, state: &mut GoalState, goal_id: &str) {
        let mut current = Some(goal_id.to_string());
        while let Some(id) = current.take() {
            let Some(goal) = state.goals.get(&id) else {
                break;
            };
            let Some(mean) = state.children_mean_progress(goal) else {
                break;
            };
            let Some(goal) = state.goals.get_mut(&id) else {
                break;
            };
            goal.progress = mean.clamp(0.0, 100.0);
            let reached =
                !goal.milestone_reached && goal.progress >= 100.0 && goal.evaluate_success();
            if reached {
                goal.milestone_reached = true;
            }
            current = goal.parent_id.clone();
            self.events.publish(Event::GoalUpdated {
                goal_id: id.clone(),
                progress: mean,
            });
            if reached {
                info!(goal_id = %id, "milestone reached");
                self.events.publish(Event::MilestoneReached { goal_id: id });
            }
        }
    }
}
