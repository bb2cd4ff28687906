//! Goal decomposition into phased, retryable subtasks.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::commands::{CommandBatch, ordered_commands, with_run_prefix};
use crate::core::selector::{Schedulable, first_ready};
use crate::core::target::{
    detect_category, estimate_duration_secs, recon_templates, render_command, task_type_for_tool,
    tool_name,
};
use crate::core::types::{AgentId, PlanStatus, ScanMode, TaskStatus, TaskType};
use crate::events::{Event, EventBus};
use crate::goals::Goal;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub name: String,
    pub description: String,
    pub task_type: TaskType,
    /// Always carries the `RUN ` prefix.
    pub command: String,
    pub goal_id: String,
    pub plan_id: Option<String>,
    pub status: TaskStatus,
    pub priority: i32,
    pub dependencies: Vec<String>,
    pub estimated_duration_secs: u64,
    pub actual_duration_secs: Option<f64>,
    pub output: String,
    pub error: String,
    pub agent_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip)]
    seq: u64,
}

impl Schedulable for SubTask {
    type Priority = i32;

    fn priority(&self) -> i32 {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    pub goal_id: String,
    pub name: String,
    pub tasks: Vec<String>,
    /// Populated phases only, keyed by phase index.
    pub phases: BTreeMap<u32, Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub current_phase: u32,
    pub status: PlanStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanProgress {
    pub plan_id: String,
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub current_phase: u32,
    pub total_phases: usize,
    pub progress: f64,
    pub status: PlanStatus,
}

#[derive(Debug, Default)]
struct PlannerState {
    tasks: HashMap<String, SubTask>,
    plans: HashMap<String, ExecutionPlan>,
    plan_order: Vec<String>,
    next_task_id: u64,
    next_plan_id: u64,
}

impl PlannerState {
    fn is_task_completed(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .is_some_and(|t| t.status == TaskStatus::Completed)
    }

    fn is_task_terminal(&self, task_id: &str) -> bool {
        self.tasks.get(task_id).is_some_and(|t| t.status.is_terminal())
    }

    #[allow(clippy::too_many_arguments)]
    fn new_task(
        &mut self,
        name: String,
        description: String,
        task_type: TaskType,
        command: String,
        goal_id: &str,
        priority: i32,
        estimated_duration_secs: u64,
        max_retries: u32,
    ) -> SubTask {
        let seq = self.next_task_id;
        self.next_task_id += 1;
        SubTask {
            id: format!("task_{seq}"),
            name,
            description,
            task_type,
            command,
            goal_id: goal_id.to_string(),
            plan_id: None,
            status: TaskStatus::Pending,
            priority,
            dependencies: Vec::new(),
            estimated_duration_secs,
            actual_duration_secs: None,
            output: String::new(),
            error: String::new(),
            agent_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            seq,
        }
    }

    /// Ready pending task in the plan's current phase, advancing past
    /// phases whose tasks are all terminal.
    fn next_in_plan(
        &mut self,
        plan_id: &str,
        events: &EventBus,
        skip: &HashSet<String>,
    ) -> Option<String> {
        loop {
            let plan = self.plans.get(plan_id)?;
            if plan.status == PlanStatus::Completed {
                return None;
            }
            let phase = plan.current_phase;
            let phase_tasks = plan.phases.get(&phase).cloned().unwrap_or_default();

            let pending: Vec<&SubTask> = phase_tasks
                .iter()
                .filter_map(|id| self.tasks.get(id))
                .filter(|t| t.status == TaskStatus::Pending && !skip.contains(&t.id))
                .collect();
            if let Some(task) = first_ready(pending, |dep| self.is_task_completed(dep)) {
                return Some(task.id.clone());
            }

            if !phase_tasks.iter().all(|id| self.is_task_terminal(id)) {
                return None;
            }
            self.advance_phase(plan_id, events);
        }
    }

    /// Move the plan past its fully terminal current phase.
    fn advance_phase(&mut self, plan_id: &str, events: &EventBus) {
        let Some(plan) = self.plans.get_mut(plan_id) else {
            return;
        };
        let finished = plan.current_phase;
        events.publish(Event::PhaseCompleted {
            plan_id: plan_id.to_string(),
            phase: finished,
        });
        let next = plan
            .phases
            .range(finished.saturating_add(1)..)
            .next()
            .map(|(phase, _)| *phase);
        match next {
            Some(phase) => {
                debug!(plan_id, from = finished, to = phase, "plan phase advanced");
                plan.current_phase = phase;
            }
            None => {
                info!(plan_id, "plan completed");
                plan.status = PlanStatus::Completed;
                events.publish(Event::PlanCompleted {
                    plan_id: plan_id.to_string(),
                });
            }
        }
    }

    /// Advance every phase of `plan_id` that is already fully terminal.
    fn settle_plan(&mut self, plan_id: &str, events: &EventBus) {
        loop {
            let Some(plan) = self.plans.get(plan_id) else {
                return;
            };
            if plan.status == PlanStatus::Completed {
                return;
            }
            let done = plan
                .phases
                .get(&plan.current_phase)
                .is_none_or(|ids| ids.iter().all(|id| self.is_task_terminal(id)));
            if !done {
                return;
            }
            self.advance_phase(plan_id, events);
        }
    }

    fn next_unplanned(&self, skip: &HashSet<String>) -> Option<String> {
        let pending: Vec<&SubTask> = self
            .tasks
            .values()
            .filter(|t| {
                t.plan_id.is_none() && t.status == TaskStatus::Pending && !skip.contains(&t.id)
            })
            .collect();
        first_ready(pending, |dep| self.is_task_completed(dep)).map(|t| t.id.clone())
    }

    fn next_ready(&mut self, events: &EventBus, skip: &HashSet<String>) -> Option<String> {
        let active: Vec<String> = self
            .plan_order
            .iter()
            .filter(|id| {
                self.plans
                    .get(*id)
                    .is_some_and(|p| p.status == PlanStatus::Pending)
            })
            .cloned()
            .collect();
        for plan_id in active {
            if let Some(task_id) = self.next_in_plan(&plan_id, events, skip) {
                return Some(task_id);
            }
        }
        self.next_unplanned(skip)
    }
}

/// Owner of every plan and subtask in a session.
pub struct Planner {
    state: Mutex<PlannerState>,
    events: EventBus,
    max_retries: u32,
}

impl Planner {
    pub fn new(events: EventBus) -> Self {
        Self::with_max_retries(events, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(events: EventBus, max_retries: u32) -> Self {
        Self {
            state: Mutex::new(PlannerState {
                next_task_id: 1,
                next_plan_id: 1,
                ..PlannerState::default()
            }),
            events,
            max_retries: max_retries.max(1),
        }
    }

    /// Build the reconnaissance plan for a goal whose metadata names a target.
    pub fn create_plan(&self, goal: &Goal, mode: ScanMode) -> ExecutionPlan {
        let target = goal.target().unwrap_or_default();
        let category = detect_category(target);
        let mut state = self.state.lock();

        let mut tasks = Vec::new();
        for (i, (template, description)) in recon_templates(category).iter().enumerate() {
            let command = render_command(template, target, mode);
            let tool = tool_name(&command).to_string();
            let task = state.new_task(
                (*description).to_string(),
                format!("Execute: {command}"),
                task_type_for_tool(&tool),
                with_run_prefix(&command),
                &goal.id,
                10 - i as i32,
                estimate_duration_secs(&tool, mode),
                self.max_retries,
            );
            tasks.push(task);
        }

        let mut phases: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for task in &tasks {
            phases.entry(task.task_type.phase()).or_default().push(task.id.clone());
        }

        let seq = state.next_plan_id;
        state.next_plan_id += 1;
        let plan = ExecutionPlan {
            id: format!("plan_{seq}"),
            goal_id: goal.id.clone(),
            name: format!("Plan for {}", goal.name),
            tasks: tasks.iter().map(|t| t.id.clone()).collect(),
            current_phase: phases.keys().next().copied().unwrap_or(0),
            phases,
            created_at: Utc::now(),
            status: PlanStatus::Pending,
        };

        for mut task in tasks {
            task.plan_id = Some(plan.id.clone());
            self.events.publish(Event::TaskCreated {
                task_id: task.id.clone(),
                goal_id: goal.id.clone(),
            });
            state.tasks.insert(task.id.clone(), task);
        }
        state.plan_order.push(plan.id.clone());
        state.plans.insert(plan.id.clone(), plan.clone());
        info!(
            plan_id = %plan.id,
            goal_id = %goal.id,
            category = %category,
            tasks = plan.tasks.len(),
            "plan created"
        );
        self.events.publish(Event::PlanCreated {
            plan_id: plan.id.clone(),
            goal_id: goal.id.clone(),
            tasks: plan.tasks.len(),
        });

        if plan.tasks.is_empty() {
            state.settle_plan(&plan.id, &self.events);
            return state.plans.get(&plan.id).cloned().unwrap_or(plan);
        }
        plan
    }

    /// One custom task outside any plan.
    pub fn add_custom_task(
        &self,
        goal_id: &str,
        command: &str,
        name: &str,
        priority: i32,
    ) -> SubTask {
        let mut state = self.state.lock();
        let task = state.new_task(
            name.to_string(),
            format!("Custom: {command}"),
            TaskType::Custom,
            with_run_prefix(command),
            goal_id,
            priority,
            estimate_duration_secs(tool_name(command), ScanMode::Normal),
            self.max_retries,
        );
        state.tasks.insert(task.id.clone(), task.clone());
        debug!(task_id = %task.id, goal_id, "custom task added");
        self.events.publish(Event::TaskCreated {
            task_id: task.id.clone(),
            goal_id: goal_id.to_string(),
        });
        task
    }

    /// Custom tasks from an oracle batch, in numeric key order.
    pub fn add_tasks_from_llm(&self, goal_id: &str, commands: &CommandBatch) -> Vec<SubTask> {
        ordered_commands(commands)
            .into_iter()
            .map(|(key, command)| {
                let priority = llm_task_priority(key);
                self.add_custom_task(goal_id, command, &format!("LLM Task {key}"), priority)
            })
            .collect()
    }

    /// Next ready pending task of a plan's current phase (without claiming it).
    pub fn get_next_task(&self, plan_id: &str) -> Option<SubTask> {
        let mut state = self.state.lock();
        let task_id = state.next_in_plan(plan_id, &self.events, &HashSet::new())?;
        state.tasks.get(&task_id).cloned()
    }

    /// Next ready task across active plans (creation order), then unplanned tasks.
    pub fn next_ready_task(&self) -> Option<SubTask> {
        self.next_ready_task_except(&HashSet::new())
    }

    /// Like [`Planner::next_ready_task`], passing over the ids in `skip`.
    pub fn next_ready_task_except(&self, skip: &HashSet<String>) -> Option<SubTask> {
        let mut state = self.state.lock();
        let task_id = state.next_ready(&self.events, skip)?;
        state.tasks.get(&task_id).cloned()
    }

    /// Select and claim the next ready task in one guarded step.
    pub fn claim_next_ready(&self) -> Option<SubTask> {
        let mut state = self.state.lock();
        let task_id = state.next_ready(&self.events, &HashSet::new())?;
        let task = state.tasks.get_mut(&task_id)?;
        task.status = TaskStatus::Queued;
        debug!(task_id = %task.id, "task claimed");
        Some(task.clone())
    }

    /// Pending -> queued. False if the task is missing or not pending.
    pub fn claim_task(&self, task_id: &str) -> bool {
        let mut state = self.state.lock();
        match state.tasks.get_mut(task_id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Queued;
                true
            }
            _ => false,
        }
    }

    /// Pending or queued -> running, stamping the agent and start time.
    pub fn start_task(&self, task_id: &str, agent_id: AgentId) -> bool {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(task_id) else {
            return false;
        };
        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Queued) {
            warn!(task_id, status = ?task.status, "cannot start task");
            return false;
        }
        task.status = TaskStatus::Running;
        task.agent_id = Some(agent_id);
        task.started_at = Some(Utc::now());
        self.events.publish(Event::TaskStarted {
            task_id: task_id.to_string(),
            agent_id,
        });
        true
    }

    /// Record a task outcome.
    ///
    /// A failure below `max_retries` returns the task to pending for
    /// re-selection; reaching it fails the task for good. Terminal tasks are
    /// left untouched and yield false.
    pub fn complete_task(&self, task_id: &str, output: &str, success: bool) -> bool {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(task_id) else {
            return false;
        };
        if task.status.is_terminal() {
            debug!(task_id, status = ?task.status, "ignoring completion of terminal task");
            return false;
        }

        let now = Utc::now();
        if let Some(started) = task.started_at {
            task.actual_duration_secs = Some((now - started).num_milliseconds() as f64 / 1000.0);
        }

        let plan_id = task.plan_id.clone();
        if success {
            task.status = TaskStatus::Completed;
            task.output = output.to_string();
            task.completed_at = Some(now);
            debug!(task_id, "task completed");
            self.events.publish(Event::TaskCompleted {
                task_id: task_id.to_string(),
            });
        } else {
            task.retry_count += 1;
            task.error = output.to_string();
            let retry_count = task.retry_count;
            if retry_count >= task.max_retries {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(now);
                warn!(task_id, retry_count, "task failed, retries exhausted");
                self.events.publish(Event::TaskFailed {
                    task_id: task_id.to_string(),
                    retry_count,
                });
            } else {
                task.status = TaskStatus::Pending;
                task.agent_id = None;
                task.started_at = None;
                debug!(task_id, retry_count, "task will be retried");
                self.events.publish(Event::TaskRetrying {
                    task_id: task_id.to_string(),
                    retry_count,
                });
            }
        }

        if let Some(plan_id) = plan_id {
            state.settle_plan(&plan_id, &self.events);
        }
        true
    }

    /// Mark a non-terminal task skipped.
    pub fn skip_task(&self, task_id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(task_id) else {
            return false;
        };
        if task.status.is_terminal() {
            return false;
        }
        task.status = TaskStatus::Skipped;
        task.completed_at = Some(Utc::now());
        let plan_id = task.plan_id.clone();
        if let Some(plan_id) = plan_id {
            state.settle_plan(&plan_id, &self.events);
        }
        true
    }

    pub fn plan_progress(&self, plan_id: &str) -> Option<PlanProgress> {
        let state = self.state.lock();
        let plan = state.plans.get(plan_id)?;
        let count = |status: TaskStatus| {
            plan.tasks
                .iter()
                .filter(|id| state.tasks.get(*id).is_some_and(|t| t.status == status))
                .count()
        };
        let total = plan.tasks.len();
        let completed = count(TaskStatus::Completed);
        Some(PlanProgress {
            plan_id: plan.id.clone(),
            total_tasks: total,
            completed,
            failed: count(TaskStatus::Failed),
            current_phase: plan.current_phase,
            total_phases: plan.phases.len(),
            progress: if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            status: plan.status,
        })
    }

    pub fn get_task(&self, task_id: &str) -> Option<SubTask> {
        self.state.lock().tasks.get(task_id).cloned()
    }

    pub fn get_plan(&self, plan_id: &str) -> Option<ExecutionPlan> {
        self.state.lock().plans.get(plan_id).cloned()
    }

    /// Plan tasks in plan order.
    pub fn plan_tasks(&self, plan_id: &str) -> Vec<SubTask> {
        let state = self.state.lock();
        let Some(plan) = state.plans.get(plan_id) else {
            return Vec::new();
        };
        plan.tasks
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .cloned()
            .collect()
    }

    /// Pending tasks in creation order.
    pub fn tasks_for_queue(&self) -> Vec<SubTask> {
        let state = self.state.lock();
        let mut tasks: Vec<SubTask> = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.seq);
        tasks
    }

    pub fn pending_count(&self) -> usize {
        self.count_where(|t| t.status == TaskStatus::Pending)
    }

    /// Queued plus running.
    pub fn in_flight_count(&self) -> usize {
        self.count_where(|t| t.status.is_in_flight())
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.tasks.clear();
        state.plans.clear();
        state.plan_order.clear();
    }

    fn count_where<F: Fn(&SubTask) -> bool>(&self, predicate: F) -> usize {
        self.state.lock().tasks.values().filter(|t| predicate(t)).count()
    }
}

/// `10 - key`, saturating at `i32::MIN` for keys past the `i32` range.
fn llm_task_priority(key: u64) -> i32 {
    i64::try_from(key)
        .ok()
        .and_then(|key| i32::try_from(10_i64.saturating_sub(key)).ok())
        .unwrap_or(i32::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::GoalSystem;

    fn setup(target: &str) -> (Planner, Goal) {
        let events = EventBus::new(256);
        let goals = GoalSystem::new(events.clone());
        let goal = goals.create_from_objective("recon", target, ScanMode::Normal);
        (Planner::new(events), goal)
    }

    fn drain(planner: &Planner, plan_id: &str) -> Vec<String> {
        let mut order = Vec::new();
        while let Some(task) = planner.get_next_task(plan_id) {
            planner.complete_task(&task.id, "ok", true);
            order.push(tool_name(&task.command).to_string());
        }
        order
    }

    #[test]
    fn domain_plan_follows_tool_table_phases() {
        let (planner, goal) = setup("example.com");
        let plan = planner.create_plan(&goal, ScanMode::Normal);
        assert_eq!(plan.tasks.len(), 5);
        assert_eq!(plan.phases.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(plan.phases[&0].len(), 3);
        assert_eq!(plan.phases[&2].len(), 2);
        assert_eq!(plan.current_phase, 0);

        let tasks = planner.plan_tasks(&plan.id);
        assert_eq!(tasks[0].command, "RUN whois example.com");
        assert_eq!(tasks[1].command, "RUN dig example.com ANY");
        assert_eq!(tasks[0].priority, 10);
        assert_eq!(tasks[4].priority, 6);
    }

    #[test]
    fn omitted_phases_are_skipped_until_plan_completes() {
        let (planner, goal) = setup("example.com");
        let plan = planner.create_plan(&goal, ScanMode::Normal);
        let order = drain(&planner, &plan.id);
        assert_eq!(order, vec!["whois", "dig", "nslookup", "subfinder", "amass"]);
        assert_eq!(planner.get_plan(&plan.id).expect("plan").status, PlanStatus::Completed);
    }

    #[test]
    fn phase_does_not_advance_while_a_task_is_in_flight() {
        let (planner, goal) = setup("https://example.com");
        let plan = planner.create_plan(&goal, ScanMode::Normal);
        assert_eq!(plan.phases.keys().copied().collect::<Vec<_>>(), vec![0, 2, 3]);

        let curl = planner.get_next_task(&plan.id).expect("curl");
        assert!(planner.claim_task(&curl.id));
        let whatweb = planner.get_next_task(&plan.id).expect("whatweb");
        planner.complete_task(&whatweb.id, "ok", true);

        assert!(planner.get_next_task(&plan.id).is_none());
        assert_eq!(planner.get_plan(&plan.id).expect("plan").current_phase, 0);

        assert!(planner.start_task(&curl.id, 1));
        planner.complete_task(&curl.id, "ok", true);
        assert_eq!(planner.get_plan(&plan.id).expect("plan").current_phase, 2);
    }

    #[test]
    fn retries_until_max_then_fails_for_good() {
        let (planner, goal) = setup("example.com");
        let plan = planner.create_plan(&goal, ScanMode::Normal);
        let whois = planner.get_next_task(&plan.id).expect("whois");

        for attempt in 1..=2 {
            assert!(planner.start_task(&whois.id, 1));
            assert!(planner.complete_task(&whois.id, "boom", false));
            let task = planner.get_task(&whois.id).expect("task");
            assert_eq!(task.retry_count, attempt);
            assert_eq!(task.status, TaskStatus::Pending);
            assert_eq!(task.agent_id, None);
        }

        assert!(planner.complete_task(&whois.id, "boom", false));
        let task = planner.get_task(&whois.id).expect("task");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 3);
        assert_eq!(task.error, "boom");

        assert!(!planner.complete_task(&whois.id, "boom", false));
        assert!(!planner.complete_task(&whois.id, "ok", true));
        assert_eq!(planner.get_task(&whois.id).expect("task").retry_count, 3);
    }

    #[test]
    fn retried_task_is_reselected_first() {
        let (planner, goal) = setup("example.com");
        planner.create_plan(&goal, ScanMode::Normal);
        let first = planner.claim_next_ready().expect("first");
        planner.complete_task(&first.id, "boom", false);
        assert_eq!(planner.claim_next_ready().expect("again").id, first.id);
    }

    #[test]
    fn stealth_plan_rewrites_commands_and_durations() {
        let (planner, goal) = setup("https://example.com");
        let tasks = {
            let plan = planner.create_plan(&goal, ScanMode::Stealth);
            planner.plan_tasks(&plan.id)
        };
        assert_eq!(tasks[0].command, "RUN curl --max-time 30 -I https://example.com");
        assert_eq!(tasks[0].estimated_duration_secs, 15);
        assert!(tasks[3].command.starts_with("RUN gobuster -t 1 --delay 1s dir"));
        assert!(!tasks.iter().any(|t| t.command.contains("-t 50")));
    }

    #[test]
    fn llm_tasks_follow_numeric_key_order() {
        let (planner, goal) = setup("example.com");
        let mut batch = CommandBatch::new();
        batch.insert("2".to_string(), "RUN dig example.com MX".to_string());
        batch.insert("1".to_string(), "RUN host example.com".to_string());
        batch.insert("10".to_string(), "echo late".to_string());
        let tasks = planner.add_tasks_from_llm(&goal.id, &batch);

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].name, "LLM Task 1");
        assert_eq!(tasks[0].priority, 9);
        assert_eq!(tasks[2].command, "RUN echo late");
        assert_eq!(tasks[2].priority, 0);
        assert!(tasks.iter().all(|t| t.task_type == TaskType::Custom && t.plan_id.is_none()));

        assert_eq!(planner.next_ready_task().expect("next").id, tasks[0].id);
    }

    #[test]
    fn llm_priority_saturates_for_huge_keys() {
        assert_eq!(llm_task_priority(1), 9);
        assert_eq!(llm_task_priority(12), -2);
        assert_eq!(llm_task_priority(u64::from(u32::MAX) * 4), i32::MIN);
        assert_eq!(llm_task_priority(u64::MAX), i32::MIN);
    }

    #[test]
    fn active_plans_are_served_before_unplanned_tasks() {
        let (planner, goal) = setup("example.com");
        let custom = planner.add_custom_task(&goal.id, "id", "Custom Task", 100);
        let plan = planner.create_plan(&goal, ScanMode::Normal);
        for _ in 0..5 {
            let task = planner.claim_next_ready().expect("plan task");
            assert_eq!(task.plan_id.as_deref(), Some(plan.id.as_str()));
            planner.complete_task(&task.id, "ok", true);
        }
        assert_eq!(planner.claim_next_ready().expect("custom").id, custom.id);
        assert!(planner.claim_next_ready().is_none());
        assert_eq!(planner.in_flight_count(), 1);
    }

    #[test]
    fn next_ready_passes_over_skipped_ids() {
        let (planner, goal) = setup("192.168.1.1");
        planner.create_plan(&goal, ScanMode::Normal);
        let first = planner.next_ready_task().expect("first");
        let skip = HashSet::from([first.id.clone()]);
        let second = planner.next_ready_task_except(&skip).expect("second");
        assert_ne!(second.id, first.id);
        assert_eq!(planner.next_ready_task().expect("unchanged").id, first.id);
    }

    #[test]
    fn progress_reports_completed_and_failed() {
        let (planner, goal) = setup("192.168.1.1");
        let plan = planner.create_plan(&goal, ScanMode::Normal);
        let first = planner.claim_next_ready().expect("first");
        planner.complete_task(&first.id, "ok", true);
        let second = planner.claim_next_ready().expect("second");
        assert!(planner.skip_task(&second.id));

        let progress = planner.plan_progress(&plan.id).expect("progress");
        assert_eq!(progress.total_tasks, 3);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.total_phases, 1);
        assert!((progress.progress - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(planner.pending_count(), 1);
    }
}
