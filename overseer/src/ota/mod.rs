//! Observe-think-act control loop.
//!
//! Each iteration observes goals, tasks and memory, reasons about what to do
//! next, gates every proposal through the [`ApprovalPolicy`], executes the
//! approved ones and checks whether the session is complete. Proposals that
//! need approval wait in a pending list until [`OtaLoop::approve`] or
//! [`OtaLoop::reject`] is called; they never time out.

pub mod action;
pub mod observe;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::commands::{is_end_signal, parse_commands};
use crate::core::policy::ApprovalPolicy;
use crate::core::types::{AgentId, AutonomyLevel, SafetyMode};
use crate::events::{Event, EventBus};
use crate::findings::{Finding, MemoryContext, RECENT_FINDINGS_LIMIT};
use crate::goals::GoalSystem;
use crate::io::config::OtaSettings;
use crate::io::executor::Executor;
use crate::io::oracle::Oracle;
use crate::planner::Planner;

use self::action::{Action, ActionKind, ActionResult};
use self::observe::{GoalSnapshot, OBSERVED_FINDINGS, Observation, TaskSnapshot, Thought, think};

/// Agent id reported to the executor for commands the loop runs itself.
pub const LOOP_AGENT_ID: AgentId = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtaState {
    pub running: bool,
    pub paused: bool,
    pub loop_count: u32,
    pub autonomy: AutonomyLevel,
    pub safety: SafetyMode,
    pub pending_approvals: usize,
    pub total_observations: usize,
    pub total_thoughts: usize,
    pub total_actions: usize,
}

/// What one observe/think/act/check cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationOutcome {
    pub iteration: u32,
    pub observed: bool,
    pub proposed: usize,
    pub executed: usize,
    pub parked: usize,
    pub errors: usize,
    /// No active goals and no pending or in-flight tasks remain.
    pub complete: bool,
    /// The oracle asked to end the session.
    pub end_requested: bool,
}

#[derive(Debug, Default)]
struct History {
    observations: VecDeque<Observation>,
    thoughts: VecDeque<Thought>,
    actions: VecDeque<Action>,
    pending: Vec<Action>,
    next_action_id: u64,
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, limit: usize) {
    buf.push_back(item);
    while buf.len() > limit {
        buf.pop_front();
    }
}

struct Shared {
    goals: Arc<GoalSystem>,
    planner: Arc<Planner>,
    memory: Arc<dyn MemoryContext>,
    executor: Option<Arc<dyn Executor>>,
    oracle: Option<Arc<dyn Oracle>>,
    events: EventBus,
    settings: OtaSettings,
    policy: Mutex<ApprovalPolicy>,
    history: Mutex<History>,
    /// Goals observed but never auto-completed by the loop.
    reserved: Mutex<HashSet<String>>,
    running: AtomicBool,
    paused: AtomicBool,
    end_requested: AtomicBool,
    loop_count: AtomicU32,
}

pub struct OtaLoop {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl OtaLoop {
    pub fn new(
        goals: Arc<GoalSystem>,
        planner: Arc<Planner>,
        memory: Arc<dyn MemoryContext>,
        events: EventBus,
        settings: OtaSettings,
    ) -> Self {
        Self::with_collaborators(goals, planner, memory, events, settings, None, None)
    }

    pub fn with_collaborators(
        goals: Arc<GoalSystem>,
        planner: Arc<Planner>,
        memory: Arc<dyn MemoryContext>,
        events: EventBus,
        settings: OtaSettings,
        executor: Option<Arc<dyn Executor>>,
        oracle: Option<Arc<dyn Oracle>>,
    ) -> Self {
        let policy = ApprovalPolicy::new(settings.autonomy, settings.safety);
        Self {
            shared: Arc::new(Shared {
                goals,
                planner,
                memory,
                executor,
                oracle,
                events,
                settings,
                policy: Mutex::new(policy),
                history: Mutex::new(History {
                    next_action_id: 1,
                    ..History::default()
                }),
                reserved: Mutex::new(HashSet::new()),
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                end_requested: AtomicBool::new(false),
                loop_count: AtomicU32::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the control cycle. False if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.end_requested.store(false, Ordering::SeqCst);
        self.shared.loop_count.store(0, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        *self.handle.lock() = Some(tokio::spawn(shared.run_loop()));
        info!("control loop started");
        true
    }

    /// Clear the running flag and wait (bounded) for the cycle to exit.
    ///
    /// Returns false if the cycle did not exit within `stop_timeout_secs`.
    pub async fn stop(&self) -> bool {
        self.shared.running.store(false, Ordering::SeqCst);
        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            return true;
        };
        let timeout = Duration::from_secs(self.shared.settings.stop_timeout_secs);
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(error = %err, "control loop task ended abnormally");
                true
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "control loop did not stop in time");
                false
            }
        }
    }

    /// Wait for a running cycle to finish on its own.
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            warn!(error = %err, "control loop task ended abnormally");
        }
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Leave `goal_id` for its owner to finish; completion checks skip it.
    pub fn reserve_goal(&self, goal_id: &str) {
        self.shared.reserved.lock().insert(goal_id.to_string());
    }

    pub fn set_autonomy(&self, autonomy: AutonomyLevel) {
        self.shared.policy.lock().autonomy = autonomy;
    }

    pub fn set_safety(&self, safety: SafetyMode) {
        self.shared.policy.lock().safety = safety;
    }

    pub fn policy(&self) -> ApprovalPolicy {
        *self.shared.policy.lock()
    }

    /// Run a single observe/think/act/check cycle.
    pub async fn run_iteration(&self) -> IterationOutcome {
        self.shared.run_iteration().await
    }

    pub fn pending_approvals(&self) -> Vec<Action> {
        self.shared.history.lock().pending.clone()
    }

    /// Approve a parked action and execute it now.
    pub async fn approve(&self, action_id: &str) -> Option<ActionResult> {
        let mut action = self.shared.take_pending(action_id)?;
        action.approved = true;
        info!(action_id, "action approved");
        Some(self.shared.act(action).await)
    }

    /// Reject a parked action. It is recorded, never executed.
    pub fn reject(&self, action_id: &str) -> bool {
        let Some(mut action) = self.shared.take_pending(action_id) else {
            return false;
        };
        action.approved = false;
        self.shared.record_action(action);
        info!(action_id, "action rejected");
        self.shared.events.publish(Event::ActionRejected {
            action_id: action_id.to_string(),
        });
        true
    }

    /// Add an externally produced observation to the history.
    pub fn inject_observation(&self, observation: Observation) {
        self.shared.events.publish(Event::Observed {
            pending_tasks: observation.pending_tasks,
            active_goals: observation.active_goals.len(),
        });
        let limit = self.shared.settings.history_limit;
        push_bounded(&mut self.shared.history.lock().observations, observation, limit);
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.shared.history.lock().observations.iter().cloned().collect()
    }

    pub fn thoughts(&self) -> Vec<Thought> {
        self.shared.history.lock().thoughts.iter().cloned().collect()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.shared.history.lock().actions.iter().cloned().collect()
    }

    pub fn state(&self) -> OtaState {
        let policy = self.policy();
        let history = self.shared.history.lock();
        OtaState {
            running: self.is_running(),
            paused: self.is_paused(),
            loop_count: self.shared.loop_count.load(Ordering::SeqCst),
            autonomy: policy.autonomy,
            safety: policy.safety,
            pending_approvals: history.pending.len(),
            total_observations: history.observations.len(),
            total_thoughts: history.thoughts.len(),
            total_actions: history.actions.len(),
        }
    }
}

impl Shared {
    async fn run_loop(self: Arc<Self>) {
        let settings = &self.settings;
        while self.running.load(Ordering::SeqCst)
            && self.loop_count.load(Ordering::SeqCst) < settings.max_iterations
        {
            if self.paused.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(settings.pause_poll_ms)).await;
                continue;
            }

            let outcome = self.run_iteration().await;
            if outcome.complete || outcome.end_requested {
                info!(
                    iteration = outcome.iteration,
                    complete = outcome.complete,
                    "control loop finished"
                );
                break;
            }
            let delay = if outcome.errors > 0 {
                settings.error_backoff_ms
            } else {
                settings.loop_delay_ms
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.loop_count.load(Ordering::SeqCst) >= settings.max_iterations {
            warn!(max_iterations = settings.max_iterations, "control loop hit iteration cap");
        }
        self.running.store(false, Ordering::SeqCst);
    }

    async fn run_iteration(&self) -> IterationOutcome {
        let iteration = self.loop_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.publish(Event::LoopIteration { count: iteration });
        let mut outcome = IterationOutcome {
            iteration,
            ..IterationOutcome::default()
        };

        let observation = self.observe();
        let thought = observation
            .as_ref()
            .and_then(|obs| think(obs, self.oracle.is_some()));
        if let Some(obs) = observation {
            outcome.observed = true;
            self.events.publish(Event::Observed {
                pending_tasks: obs.pending_tasks,
                active_goals: obs.active_goals.len(),
            });
            push_bounded(&mut self.history.lock().observations, obs, self.settings.history_limit);
        }

        if let Some(thought) = thought {
            self.events.publish(Event::Thought {
                reasoning: thought.reasoning.clone(),
                proposed: thought.proposed.len(),
            });
            let proposed = thought.proposed.clone();
            push_bounded(&mut self.history.lock().thoughts, thought, self.settings.history_limit);

            for kind in proposed {
                let Some(action) = self.prepare(kind) else {
                    continue;
                };
                outcome.proposed += 1;
                if !action.approved {
                    outcome.parked += 1;
                    continue;
                }
                let result = self.act(action).await;
                outcome.executed += 1;
                if result.is_error() {
                    outcome.errors += 1;
                }
            }
        }

        outcome.end_requested = self.end_requested.load(Ordering::SeqCst);
        outcome.complete = self.check_completion();
        outcome
    }

    fn observe(&self) -> Option<Observation> {
        let active_goals: Vec<GoalSnapshot> = self
            .goals
            .active_goals()
            .into_iter()
            .map(|g| GoalSnapshot {
                id: g.id,
                name: g.name,
                progress: g.progress,
                status: g.status,
            })
            .collect();
        let parked: HashSet<String> = self
            .history
            .lock()
            .pending
            .iter()
            .filter_map(|a| match &a.kind {
                ActionKind::ExecuteTask { task_id, .. } => Some(task_id.clone()),
                ActionKind::RequestMoreTasks { .. } => None,
            })
            .collect();
        let observation = Observation {
            timestamp: Utc::now(),
            source: "ota_loop".to_string(),
            active_goals,
            pending_tasks: self.planner.pending_count(),
            running_tasks: self.planner.in_flight_count(),
            next_task: self.planner.next_ready_task_except(&parked).map(|t| TaskSnapshot {
                id: t.id,
                name: t.name,
                command: t.command,
            }),
            memory: self.memory.summary(),
            recent_findings: self.memory.recent_findings(OBSERVED_FINDINGS),
        };
        if observation.is_idle() {
            return None;
        }
        Some(observation)
    }

    /// Wrap a proposal and gate it. `None` when the same request is already
    /// waiting for approval.
    fn prepare(&self, kind: ActionKind) -> Option<Action> {
        let requires_approval = self
            .policy
            .lock()
            .requires_approval(kind.class(), kind.command());
        let mut history = self.history.lock();
        if history.pending.iter().any(|a| a.kind.same_request(&kind)) {
            debug!(?kind, "proposal already awaiting approval");
            return None;
        }
        let id = format!("action_{}", history.next_action_id);
        history.next_action_id += 1;
        let action = Action::new(id, kind, requires_approval);

        if requires_approval {
            history.pending.push(action.clone());
            drop(history);
            info!(action_id = %action.id, "action requires approval");
            self.events.publish(Event::ApprovalRequired {
                action_id: action.id.clone(),
                class: action.kind.class(),
            });
        }
        Some(action)
    }

    fn take_pending(&self, action_id: &str) -> Option<Action> {
        let mut history = self.history.lock();
        let pos = history.pending.iter().position(|a| a.id == action_id)?;
        Some(history.pending.remove(pos))
    }

    fn record_action(&self, action: Action) {
        push_bounded(&mut self.history.lock().actions, action, self.settings.history_limit);
    }

    async fn act(&self, mut action: Action) -> ActionResult {
        self.events.publish(Event::ActionProposed {
            action_id: action.id.clone(),
            class: action.kind.class(),
        });
        let result = match &action.kind {
            ActionKind::ExecuteTask { task_id, command } => {
                self.execute_task(task_id, command).await
            }
            ActionKind::RequestMoreTasks { goal_id } => {
                self.request_more_tasks(goal_id.as_deref()).await
            }
        };

        action.executed = !result.is_error();
        action.result = Some(result.clone());
        if let ActionResult::Error { message } = &result {
            warn!(action_id = %action.id, error = %message, "action failed");
            self.events.publish(Event::LoopError {
                message: message.clone(),
            });
        } else {
            debug!(action_id = %action.id, ?result, "action executed");
            self.events.publish(Event::ActionExecuted {
                action_id: action.id.clone(),
            });
        }
        self.record_action(action);
        result
    }

    async fn execute_task(&self, task_id: &str, command: &str) -> ActionResult {
        let Some(executor) = &self.executor else {
            return ActionResult::NoExecutor {
                command: command.to_string(),
            };
        };
        if !self.planner.claim_task(task_id) || !self.planner.start_task(task_id, LOOP_AGENT_ID) {
            return ActionResult::TaskUnavailable {
                task_id: task_id.to_string(),
            };
        }
        match executor.execute(LOOP_AGENT_ID, command).await {
            Ok(outcome) => {
                let success = outcome.is_success();
                if success && !outcome.output.trim().is_empty() {
                    self.record_finding(task_id, command, &outcome.output);
                }
                let text = if success { &outcome.output } else { &outcome.error };
                self.planner.complete_task(task_id, text, success);
                ActionResult::TaskExecuted {
                    task_id: task_id.to_string(),
                    exit_code: outcome.exit_code,
                    success,
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                self.planner.complete_task(task_id, &message, false);
                ActionResult::Error { message }
            }
        }
    }

    fn record_finding(&self, task_id: &str, command: &str, output: &str) {
        let finding = Finding::from_command_output(LOOP_AGENT_ID, command, output);
        if let Some(task) = self.planner.get_task(task_id) {
            self.goals.add_finding(&task.goal_id, finding.title.clone());
        }
        self.events.publish(Event::FindingRecorded {
            title: finding.title.clone(),
            agent_id: LOOP_AGENT_ID,
        });
        self.memory.record_finding(finding);
    }

    async fn request_more_tasks(&self, goal_id: Option<&str>) -> ActionResult {
        let Some(oracle) = &self.oracle else {
            return ActionResult::NoOracle;
        };
        let active = self.goals.active_goals();
        let goal = goal_id
            .and_then(|id| active.iter().find(|g| g.id == id))
            .or_else(|| active.first());
        let Some(goal) = goal else {
            return ActionResult::NoActiveGoal;
        };

        let findings: Vec<String> = self
            .memory
            .recent_findings(RECENT_FINDINGS_LIMIT)
            .into_iter()
            .map(|f| f.description)
            .collect();
        let response = match oracle.continue_execution(&findings, &goal.description).await {
            Ok(response) => response,
            Err(err) => {
                return ActionResult::Error {
                    message: format!("oracle continuation failed: {err:#}"),
                };
            }
        };

        let commands = parse_commands(&response);
        let added = if commands.is_empty() {
            0
        } else {
            self.planner.add_tasks_from_llm(&goal.id, &commands).len()
        };
        if is_end_signal(&response) {
            info!(tasks_added = added, "oracle signalled end of session");
            self.end_requested.store(true, Ordering::SeqCst);
            return ActionResult::SessionEnded { tasks_added: added };
        }
        if added == 0 {
            debug!("oracle returned no commands");
            return ActionResult::NoNewWork;
        }
        ActionResult::TasksAdded { count: added }
    }

    /// Auto-complete unreserved goals whose criteria are met; report whether
    /// everything is drained.
    fn check_completion(&self) -> bool {
        let reserved = self.reserved.lock().clone();
        for goal in self.goals.active_goals() {
            if !reserved.contains(&goal.id) && self.goals.evaluate_goal(&goal.id) {
                self.goals.complete_goal(&goal.id, true);
            }
        }
        self.goals.active_goals().is_empty()
            && self.planner.pending_count() == 0
            && self.planner.in_flight_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{MetricKind, ScanMode, TaskStatus};
    use crate::findings::FindingLog;
    use crate::goals::NewGoal;
    use crate::io::executor::ExecOutcome;
    use crate::test_support::{ScriptedExecutor, ScriptedOracle};

    struct Harness {
        goals: Arc<GoalSystem>,
        planner: Arc<Planner>,
        events: EventBus,
    }

    fn harness() -> Harness {
        let events = EventBus::new(512);
        Harness {
            goals: Arc::new(GoalSystem::new(events.clone())),
            planner: Arc::new(Planner::new(events.clone())),
            events,
        }
    }

    fn settings(autonomy: AutonomyLevel) -> OtaSettings {
        OtaSettings {
            autonomy,
            loop_delay_ms: 1,
            pause_poll_ms: 1,
            error_backoff_ms: 1,
            max_iterations: 20,
            ..OtaSettings::default()
        }
    }

    fn build(
        h: &Harness,
        autonomy: AutonomyLevel,
        executor: Option<Arc<dyn Executor>>,
        oracle: Option<Arc<dyn Oracle>>,
    ) -> OtaLoop {
        OtaLoop::with_collaborators(
            Arc::clone(&h.goals),
            Arc::clone(&h.planner),
            Arc::new(FindingLog::new()),
            h.events.clone(),
            settings(autonomy),
            executor,
            oracle,
        )
    }

    #[tokio::test]
    async fn idle_system_observes_nothing_and_completes() {
        let h = harness();
        let ota = build(&h, AutonomyLevel::Autonomous, None, None);
        let outcome = ota.run_iteration().await;
        assert!(!outcome.observed);
        assert_eq!(outcome.proposed, 0);
        assert!(outcome.complete);
    }

    #[tokio::test]
    async fn manual_autonomy_parks_every_action() {
        let h = harness();
        let goal = h.goals.create_goal(NewGoal::new("g"));
        h.goals.start_goal(&goal.id);
        h.planner.add_custom_task(&goal.id, "id", "Custom Task", 5);
        let executor = Arc::new(ScriptedExecutor::new());
        let ota = build(&h, AutonomyLevel::Manual, Some(executor.clone()), None);

        let first = ota.run_iteration().await;
        assert_eq!((first.proposed, first.parked, first.executed), (1, 1, 0));
        let second = ota.run_iteration().await;
        assert_eq!(second.proposed, 0, "same task is not proposed twice while parked");
        assert_eq!(ota.pending_approvals().len(), 1);
        assert!(executor.calls().is_empty());
        assert!(!second.complete);
    }

    #[tokio::test]
    async fn parked_task_does_not_block_the_next_one() {
        let h = harness();
        let goal = h.goals.create_goal(NewGoal::new("g"));
        h.goals.start_goal(&goal.id);
        let first = h.planner.add_custom_task(&goal.id, "id", "Custom Task", 5);
        let second = h.planner.add_custom_task(&goal.id, "whoami", "Custom Task", 5);
        let ota = build(&h, AutonomyLevel::Supervised, None, None);

        ota.run_iteration().await;
        ota.run_iteration().await;
        let parked: Vec<String> = ota
            .pending_approvals()
            .into_iter()
            .filter_map(|a| match a.kind {
                ActionKind::ExecuteTask { task_id, .. } => Some(task_id),
                ActionKind::RequestMoreTasks { .. } => None,
            })
            .collect();
        assert_eq!(parked, vec![first.id, second.id]);

        let third = ota.run_iteration().await;
        assert_eq!(third.proposed, 0);
    }

    #[tokio::test]
    async fn reserved_goal_is_left_for_its_owner() {
        let h = harness();
        let goal = h.goals.create_from_objective("recon", "192.168.1.1", ScanMode::Normal);
        h.goals.start_goal(&goal.id);
        h.goals.add_finding(&goal.id, "host up");
        h.goals.record_metric(&goal.id, MetricKind::Boolean, 1.0);
        let ota = build(&h, AutonomyLevel::FullAutonomous, None, None);
        ota.reserve_goal(&goal.id);

        let outcome = ota.run_iteration().await;
        assert!(!outcome.complete);
        assert_eq!(
            h.goals.get_goal(&goal.id).expect("goal").status,
            crate::core::types::GoalStatus::InProgress
        );
    }

    #[tokio::test]
    async fn approving_executes_and_reports_into_planner() {
        let h = harness();
        let goal = h.goals.create_goal(NewGoal::new("g"));
        h.goals.start_goal(&goal.id);
        let task = h.planner.add_custom_task(&goal.id, "whoami", "Custom Task", 5);
        let executor = Arc::new(ScriptedExecutor::new());
        executor.script("RUN whoami", [ExecOutcome::success("root\n")]);
        let ota = build(&h, AutonomyLevel::Supervised, Some(executor.clone()), None);

        ota.run_iteration().await;
        let parked = ota.pending_approvals();
        assert_eq!(parked.len(), 1);

        let result = ota.approve(&parked[0].id).await.expect("approved");
        assert_eq!(
            result,
            ActionResult::TaskExecuted {
                task_id: task.id.clone(),
                exit_code: 0,
                success: true
            }
        );
        let done = h.planner.get_task(&task.id).expect("task");
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.output, "root\n");
        assert!(ota.pending_approvals().is_empty());
        assert!(ota.approve(&parked[0].id).await.is_none());
    }

    #[tokio::test]
    async fn rejected_action_is_recorded_not_executed() {
        let h = harness();
        let goal = h.goals.create_goal(NewGoal::new("g"));
        h.goals.start_goal(&goal.id);
        h.planner.add_custom_task(&goal.id, "rm -rf /tmp/x", "Custom Task", 5);
        let executor = Arc::new(ScriptedExecutor::new());
        let ota = build(&h, AutonomyLevel::Autonomous, Some(executor.clone()), None);

        ota.run_iteration().await;
        let parked = ota.pending_approvals();
        assert_eq!(parked.len(), 1, "dangerous command is gated");
        assert!(ota.reject(&parked[0].id));
        assert!(!ota.reject(&parked[0].id));
        assert!(executor.calls().is_empty());
        let actions = ota.actions();
        assert_eq!(actions.len(), 1);
        assert!(!actions[0].approved && !actions[0].executed);
    }

    #[tokio::test]
    async fn missing_executor_is_a_neutral_result() {
        let h = harness();
        let goal = h.goals.create_goal(NewGoal::new("g"));
        h.goals.start_goal(&goal.id);
        let task = h.planner.add_custom_task(&goal.id, "id", "Custom Task", 5);
        let ota = build(&h, AutonomyLevel::FullAutonomous, None, None);

        let outcome = ota.run_iteration().await;
        assert_eq!((outcome.executed, outcome.errors), (1, 0));
        assert_eq!(
            ota.actions()[0].result,
            Some(ActionResult::NoExecutor {
                command: "RUN id".to_string()
            })
        );
        assert_eq!(h.planner.get_task(&task.id).expect("task").status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn oracle_work_is_added_then_end_signal_stops() {
        let h = harness();
        let goal = h.goals.create_goal(NewGoal::new("g"));
        h.goals.start_goal(&goal.id);
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_continuation("RUN echo one\nRUN echo two");
        let ota = build(&h, AutonomyLevel::SemiAutonomous, None, Some(oracle.clone()));

        let first = ota.run_iteration().await;
        assert_eq!(first.executed, 1);
        assert_eq!(h.planner.pending_count(), 2);
        assert_eq!(ota.actions()[0].result, Some(ActionResult::TasksAdded { count: 2 }));

        for id in h.planner.tasks_for_queue().into_iter().map(|t| t.id) {
            h.planner.complete_task(&id, "ok", true);
        }
        let second = ota.run_iteration().await;
        assert!(second.end_requested);
        assert_eq!(oracle.continuation_calls(), 2);
    }

    #[tokio::test]
    async fn run_loop_completes_goal_and_exits() {
        let h = harness();
        let goal = h.goals.create_from_objective("recon", "192.168.1.1", ScanMode::Normal);
        h.goals.start_goal(&goal.id);
        h.planner.create_plan(&goal, ScanMode::Normal);
        h.goals.add_finding(&goal.id, "host up");
        h.goals.record_metric(&goal.id, MetricKind::Boolean, 1.0);
        let executor = Arc::new(ScriptedExecutor::new());
        let ota = build(&h, AutonomyLevel::FullAutonomous, Some(executor.clone()), None);

        assert!(ota.start());
        assert!(!ota.start());
        tokio::time::timeout(Duration::from_secs(5), ota.join())
            .await
            .expect("loop exits");
        assert!(!ota.is_running());
        assert_eq!(executor.calls().len(), 3);
        assert_eq!(
            h.goals.get_goal(&goal.id).expect("goal").status,
            crate::core::types::GoalStatus::Completed
        );
    }

    #[tokio::test]
    async fn iteration_cap_is_a_hard_stop() {
        let h = harness();
        let goal = h.goals.create_goal(NewGoal::new("never done"));
        h.goals.start_goal(&goal.id);
        let ota = build(&h, AutonomyLevel::Autonomous, None, None);

        assert!(ota.start());
        tokio::time::timeout(Duration::from_secs(5), ota.join())
            .await
            .expect("loop exits at cap");
        assert_eq!(ota.state().loop_count, 20);
    }

    #[tokio::test]
    async fn pause_then_stop_is_bounded() {
        let h = harness();
        let goal = h.goals.create_goal(NewGoal::new("g"));
        h.goals.start_goal(&goal.id);
        let mut s = settings(AutonomyLevel::Autonomous);
        s.max_iterations = u32::MAX;
        let ota = OtaLoop::new(
            Arc::clone(&h.goals),
            Arc::clone(&h.planner),
            Arc::new(FindingLog::new()),
            h.events.clone(),
            s,
        );
        ota.start();
        ota.pause();
        assert!(ota.state().paused);
        let paused_at = ota.state().loop_count;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ota.state().loop_count <= paused_at + 1);
        ota.resume();
        assert!(ota.stop().await);
        assert!(!ota.is_running());
    }
}
