//! Session composition root.
//!
//! An [`Orchestrator`] turns a [`TargetConfig`] into a root goal and plan,
//! bootstraps the plan into the queue, runs one worker per registered agent
//! and asks the oracle for continuation work whenever everything drains.
//! Components are shared through `Arc`s and only touched via their public
//! operations. The session phase lives in a `watch` channel that workers
//! wait on.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::agents::{Agent, AgentRegistry, AgentSummary};
use crate::core::commands::{is_end_signal, parse_commands};
use crate::core::target::detect_category;
use crate::core::types::{AgentId, AgentStatus, MetricKind, PlanStatus, QueueStatus, ScanMode};
use crate::events::{Event, EventBus};
use crate::findings::{Finding, FindingLog, MemoryContext};
use crate::goals::{GoalSummary, GoalSystem};
use crate::io::config::OverseerConfig;
use crate::io::executor::{ExecOutcome, Executor};
use crate::io::oracle::{Oracle, PlanRequest};
use crate::io::report;
use crate::ota::{OtaLoop, OtaState};
use crate::planner::{PlanProgress, Planner};
use crate::queue::{ItemUpdate, QueueItem, QueueManager, QueueSummary};

/// Findings handed to the oracle when asking for continuation work.
pub const CONTINUATION_FINDINGS: usize = 10;

/// What a session scans and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub target: String,
    pub mode: ScanMode,
    /// Free-form operator instructions forwarded to the oracle.
    #[serde(default)]
    pub instructions: String,
}

impl TargetConfig {
    pub fn new(target: impl Into<String>, mode: ScanMode) -> Self {
        Self {
            target: target.into(),
            mode,
            instructions: String::new(),
        }
    }

    fn objective(&self) -> String {
        if self.instructions.trim().is_empty() {
            format!("Reconnaissance of {}", self.target)
        } else {
            self.instructions.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
}

impl SessionPhase {
    pub fn is_finished(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Stopped)
    }
}

/// Point-in-time view of a session, serializable for the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub target: Option<String>,
    pub goal_id: Option<String>,
    pub plan: Option<PlanProgress>,
    pub agents: AgentSummary,
    pub queue: QueueSummary,
    pub findings: usize,
    pub goals: GoalSummary,
    pub ota: Option<OtaState>,
}

#[derive(Debug, Clone)]
struct Session {
    target: TargetConfig,
    goal_id: String,
    plan_id: String,
}

struct Inner {
    config: OverseerConfig,
    events: EventBus,
    goals: Arc<GoalSystem>,
    planner: Arc<Planner>,
    queue: QueueManager,
    agents: AgentRegistry,
    findings: Arc<FindingLog>,
    executor: Arc<dyn Executor>,
    oracle: Option<Arc<dyn Oracle>>,
    ota: Option<OtaLoop>,
    phase: watch::Sender<SessionPhase>,
    session: Mutex<Option<Session>>,
    /// Queue index -> planner task id for items fed from the plan.
    bindings: Mutex<HashMap<u64, String>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes continuation requests across workers.
    continuation: tokio::sync::Mutex<()>,
    end_requested: AtomicBool,
    plan_recorded: AtomicBool,
}

pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Wire every component around `executor` and an optional `oracle`.
    ///
    /// The embedded control loop (when `ota.enabled`) shares the executor
    /// but never calls the oracle; continuation is requested here only.
    pub fn new(
        config: OverseerConfig,
        executor: Arc<dyn Executor>,
        oracle: Option<Arc<dyn Oracle>>,
    ) -> Result<Self> {
        config.validate()?;
        let events = EventBus::new(config.event_capacity);
        let goals = Arc::new(GoalSystem::new(events.clone()));
        let planner = Arc::new(Planner::with_max_retries(events.clone(), config.max_retries));
        let findings = Arc::new(FindingLog::new());
        let ota = config.ota.enabled.then(|| {
            let memory: Arc<dyn MemoryContext> = findings.clone();
            OtaLoop::with_collaborators(
                Arc::clone(&goals),
                Arc::clone(&planner),
                memory,
                events.clone(),
                config.ota.clone(),
                Some(Arc::clone(&executor)),
                None,
            )
        });
        let (phase, _) = watch::channel(SessionPhase::Idle);
        Ok(Self {
            inner: Arc::new(Inner {
                queue: QueueManager::new(events.clone()),
                agents: AgentRegistry::new(config.max_agents, events.clone()),
                config,
                events,
                goals,
                planner,
                findings,
                executor,
                oracle,
                ota,
                phase,
                session: Mutex::new(None),
                bindings: Mutex::new(HashMap::new()),
                workers: Mutex::new(Vec::new()),
                continuation: tokio::sync::Mutex::new(()),
                end_requested: AtomicBool::new(false),
                plan_recorded: AtomicBool::new(false),
            }),
        })
    }

    /// Register an agent. A worker is spawned for it when a session is live.
    ///
    /// Returns `None` when the registry is full.
    pub fn add_agent(&self, name: &str) -> Option<Agent> {
        let agent = self.inner.agents.add_agent(name)?;
        if matches!(self.phase(), SessionPhase::Running | SessionPhase::Paused) {
            self.spawn_worker(agent.id);
        }
        Some(agent)
    }

    /// Unregister an agent; its worker exits after the current command.
    pub fn remove_agent(&self, agent_id: AgentId) -> bool {
        self.inner.agents.remove_agent(agent_id)
    }

    /// Create the root goal and plan, queue the bootstrap tasks and spawn
    /// the workers.
    ///
    /// Fails if a session was already started. With no registered agents a
    /// single `Agent-1` is added.
    #[instrument(skip_all, fields(scan_target = %target.target, mode = target.mode.as_str()))]
    pub async fn start(&self, target: TargetConfig) -> Result<()> {
        let inner = &self.inner;
        let (goal, plan) = {
            let mut session = inner.session.lock();
            if session.is_some() || inner.phase() != SessionPhase::Idle {
                bail!("session already started");
            }
            if inner.agents.all().is_empty() && inner.agents.add_agent("Agent-1").is_none() {
                bail!(
                    "no agent could be registered (max_agents = {})",
                    inner.agents.max_agents()
                );
            }
            let goal =
                inner
                    .goals
                    .create_from_objective(&target.objective(), &target.target, target.mode);
            inner.goals.start_goal(&goal.id);
            let plan = inner.planner.create_plan(&goal, target.mode);
            *session = Some(Session {
                target: target.clone(),
                goal_id: goal.id.clone(),
                plan_id: plan.id.clone(),
            });
            (goal, plan)
        };

        if let Some(oracle) = &inner.oracle {
            let request = PlanRequest {
                target: target.target.clone(),
                category: detect_category(&target.target),
                mode: target.mode,
                instructions: target.instructions.clone(),
            };
            match oracle.generate_plan(&request).await {
                Ok(response) => {
                    let commands = parse_commands(&response);
                    if !commands.is_empty() {
                        let added = inner.planner.add_tasks_from_llm(&goal.id, &commands);
                        info!(added = added.len(), "oracle plan added tasks");
                    }
                }
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "oracle plan request failed");
                    inner.events.publish(Event::Error {
                        message: format!("oracle plan request failed: {err:#}"),
                    });
                }
            }
        }

        if !inner.transition(&[SessionPhase::Idle], SessionPhase::Running) {
            bail!("session stopped during start");
        }
        inner.events.publish(Event::SessionStarted {
            target: target.target.clone(),
            goal_id: goal.id.clone(),
            plan_id: plan.id.clone(),
        });
        info!(goal_id = %goal.id, plan_id = %plan.id, tasks = plan.tasks.len(), "session started");

        inner.feed();
        for agent in inner.agents.all() {
            self.spawn_worker(agent.id);
        }
        if let Some(ota) = &inner.ota {
            ota.reserve_goal(&goal.id);
            ota.start();
        }
        Ok(())
    }

    fn spawn_worker(&self, agent_id: AgentId) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(inner.worker_loop(agent_id));
        self.inner.workers.lock().push(handle);
    }

    pub fn pause(&self) -> bool {
        if !self.inner.transition(&[SessionPhase::Running], SessionPhase::Paused) {
            return false;
        }
        if let Some(ota) = &self.inner.ota {
            ota.pause();
        }
        self.inner.events.publish(Event::SessionPaused);
        info!("session paused");
        true
    }

    pub fn resume(&self) -> bool {
        if !self.inner.transition(&[SessionPhase::Paused], SessionPhase::Running) {
            return false;
        }
        if let Some(ota) = &self.inner.ota {
            ota.resume();
        }
        self.inner.events.publish(Event::SessionResumed);
        info!("session resumed");
        true
    }

    /// Stop the session and wait (bounded) for every worker to exit.
    ///
    /// A completed session keeps its phase. Returns false if some worker or
    /// the control loop had to be abandoned.
    pub async fn stop(&self) -> bool {
        let inner = &self.inner;
        let stopped = inner.transition(
            &[SessionPhase::Idle, SessionPhase::Running, SessionPhase::Paused],
            SessionPhase::Stopped,
        );
        let mut clean = self.join_workers().await;
        if let Some(ota) = &inner.ota {
            clean &= ota.stop().await;
        }
        for agent in inner.agents.all() {
            inner.agents.update_status(agent.id, AgentStatus::Idle, "");
        }
        if stopped {
            inner.events.publish(Event::SessionStopped);
            info!(clean, "session stopped");
        }
        clean
    }

    async fn join_workers(&self) -> bool {
        let handles: Vec<JoinHandle<()>> = self.inner.workers.lock().drain(..).collect();
        let timeout = self.inner.config.worker.shutdown_timeout();
        let mut clean = true;
        for handle in handles {
            let abort = handle.abort_handle();
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "worker task ended abnormally"),
                Err(_) => {
                    warn!(timeout_secs = timeout.as_secs(), "worker did not stop in time");
                    abort.abort();
                    clean = false;
                }
            }
        }
        clean
    }

    /// Wait until the session completes or `timeout` elapses, then shut the
    /// workers down. Returns true if the session completed.
    pub async fn run_to_completion(&self, timeout: Duration) -> Result<bool> {
        if self.phase() == SessionPhase::Idle {
            bail!("session not started");
        }
        let mut rx = self.inner.phase.subscribe();
        let finished =
            tokio::time::timeout(timeout, rx.wait_for(|phase| phase.is_finished())).await;
        let completed = match finished {
            Ok(Ok(phase)) => *phase == SessionPhase::Completed,
            Ok(Err(_)) => false,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "session timed out");
                false
            }
        };
        self.stop().await;
        Ok(completed)
    }

    /// Apply a text queue command (`list`, `rm N`, `add <json>`, `clear`).
    ///
    /// Plan tasks whose queue item was removed are skipped in the planner so
    /// the session can still drain.
    pub fn handle_queue_command(&self, line: &str) -> String {
        let reply = self.inner.queue.handle_text_command(line);
        self.inner.release_orphaned_bindings();
        reply
    }

    pub fn status(&self) -> SessionStatus {
        let inner = &self.inner;
        let session = inner.session();
        SessionStatus {
            phase: self.phase(),
            target: session.as_ref().map(|s| s.target.target.clone()),
            goal_id: session.as_ref().map(|s| s.goal_id.clone()),
            plan: session
                .as_ref()
                .and_then(|s| inner.planner.plan_progress(&s.plan_id)),
            agents: inner.agents.summary(),
            queue: inner.queue.summary(),
            findings: inner.findings.len(),
            goals: inner.goals.summary(),
            ota: inner.ota.as_ref().map(OtaLoop::state),
        }
    }

    pub fn export_report(&self, path: &Path) -> Result<()> {
        report::export_report(path, &self.inner.goals)
    }

    pub fn export_findings(&self, path: &Path) -> Result<()> {
        report::export_findings(path, &self.inner.findings.all())
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.phase()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn goals(&self) -> &GoalSystem {
        &self.inner.goals
    }

    pub fn planner(&self) -> &Planner {
        &self.inner.planner
    }

    pub fn queue(&self) -> &QueueManager {
        &self.inner.queue
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.inner.agents
    }

    pub fn findings(&self) -> &FindingLog {
        &self.inner.findings
    }

    pub fn ota(&self) -> Option<&OtaLoop> {
        self.inner.ota.as_ref()
    }

    pub fn root_goal_id(&self) -> Option<String> {
        self.inner.session().map(|s| s.goal_id)
    }

    pub fn plan_id(&self) -> Option<String> {
        self.inner.session().map(|s| s.plan_id)
    }
}

impl Inner {
    fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    fn transition(&self, from: &[SessionPhase], to: SessionPhase) -> bool {
        self.phase.send_if_modified(|phase| {
            if from.contains(phase) {
                *phase = to;
                true
            } else {
                false
            }
        })
    }

    fn session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    /// Move every ready plan task into the queue.
    ///
    /// The bindings lock is held across the enqueue so a worker cannot claim
    /// the item before it is bound to its task.
    fn feed(&self) -> usize {
        let mut fed = 0;
        while let Some(task) = self.planner.claim_next_ready() {
            let mut bindings = self.bindings.lock();
            let index = self.queue.add_single(&task.command);
            debug!(index, task_id = %task.id, "fed task to queue");
            bindings.insert(index, task.id);
            fed += 1;
        }
        if fed > 0 && self.queue.finished_count() > self.config.worker.retain_finished_items {
            let pruned = self.queue.clear_completed();
            debug!(pruned, "pruned finished queue items");
        }
        fed
    }

    fn release_orphaned_bindings(&self) {
        let mut bindings = self.bindings.lock();
        bindings.retain(|index, task_id| {
            if self.queue.get(*index).is_some() {
                return true;
            }
            debug!(index, task_id = %task_id, "queue item removed, skipping task");
            self.planner.skip_task(task_id);
            false
        });
    }

    /// Nothing queued, nothing running and no plan task ready to feed.
    fn drained(&self) -> bool {
        self.queue.pending_count() == 0
            && self.queue.running_count() == 0
            && self.planner.in_flight_count() == 0
            && self.planner.next_ready_task().is_none()
    }

    async fn worker_loop(self: Arc<Self>, agent_id: AgentId) {
        let mut phase_rx = self.phase.subscribe();
        let mode = self
            .session()
            .map_or(ScanMode::Normal, |s| s.target.mode);
        debug!(agent_id, "worker started");
        loop {
            let phase = *phase_rx.borrow_and_update();
            match phase {
                SessionPhase::Running => {}
                SessionPhase::Paused => {
                    if phase_rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                SessionPhase::Idle | SessionPhase::Completed | SessionPhase::Stopped => break,
            }
            if self.agents.get(agent_id).is_none() {
                debug!(agent_id, "agent removed, worker exiting");
                break;
            }

            if let Some(item) = self.queue.get_next_pending() {
                self.run_item(agent_id, item).await;
                tokio::time::sleep(self.config.worker.dispatch_delay(mode)).await;
                continue;
            }

            self.on_idle().await;
            tokio::select! {
                _ = tokio::time::sleep(self.config.worker.idle_delay()) => {}
                changed = phase_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        self.agents.update_status(agent_id, AgentStatus::Idle, "");
        debug!(agent_id, "worker stopped");
    }

    #[instrument(skip_all, fields(agent_id = agent_id, index = item.index))]
    async fn run_item(&self, agent_id: AgentId, item: QueueItem) {
        self.agents
            .update_status(agent_id, AgentStatus::Running, &item.command);
        let task_id = self.bindings.lock().remove(&item.index);
        if let Some(task_id) = &task_id {
            self.planner.start_task(task_id, agent_id);
        }

        let outcome = match self.executor.execute(agent_id, &item.command).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %format!("{err:#}"), command = %item.command, "executor failed");
                ExecOutcome::failure(-1, format!("{err:#}"))
            }
        };
        let success = outcome.is_success();
        // Findings land before the item or task settles so a drained view
        // always includes them.
        if success && !outcome.output.trim().is_empty() {
            self.record_finding(agent_id, &item.command, &outcome.output);
        }
        let status = if success {
            QueueStatus::Completed
        } else {
            QueueStatus::Failed
        };
        self.queue.update_item(
            item.index,
            status,
            ItemUpdate {
                output: Some(outcome.output.clone()),
                error: Some(outcome.error.clone()),
                agent_id: Some(agent_id),
            },
        );
        self.agents.increment_task_count(agent_id, success);
        self.agents.update_status(agent_id, AgentStatus::Idle, "");

        if let Some(task_id) = &task_id {
            let text = if success {
                &outcome.output
            } else {
                &outcome.error
            };
            self.planner.complete_task(task_id, text, success);
        }
        debug!(success, exit_code = outcome.exit_code, "command finished");
        self.refresh_progress();
    }

    fn record_finding(&self, agent_id: AgentId, command: &str, output: &str) {
        let finding = Finding::from_command_output(agent_id, command, output);
        if let Some(session) = self.session() {
            self.goals.add_finding(&session.goal_id, finding.title.clone());
        }
        self.events.publish(Event::FindingRecorded {
            title: finding.title.clone(),
            agent_id,
        });
        self.findings.record(finding);
    }

    /// Mirror plan progress onto the root goal and record plan completion.
    fn refresh_progress(&self) {
        let Some(session) = self.session() else {
            return;
        };
        let Some(progress) = self.planner.plan_progress(&session.plan_id) else {
            return;
        };
        self.goals.update_progress(&session.goal_id, progress.progress);
        if progress.status == PlanStatus::Completed
            && !self.plan_recorded.swap(true, Ordering::SeqCst)
        {
            self.goals
                .record_metric(&session.goal_id, MetricKind::Boolean, 1.0);
        }
    }

    async fn on_idle(&self) {
        if self.feed() > 0 || !self.drained() {
            return;
        }
        self.refresh_progress();
        self.request_continuation().await;
    }

    async fn request_continuation(&self) {
        let _guard = self.continuation.lock().await;
        // Another worker may have added work or finished the session meanwhile.
        if self.phase() != SessionPhase::Running || !self.drained() {
            return;
        }
        let Some(session) = self.session() else {
            return;
        };
        let oracle = match &self.oracle {
            Some(oracle) if !self.end_requested.load(Ordering::SeqCst) => oracle,
            _ => {
                self.complete_session(&session);
                return;
            }
        };

        let findings = self.findings.recent_descriptions(CONTINUATION_FINDINGS);
        let objective = if session.target.instructions.trim().is_empty() {
            self.goals
                .get_goal(&session.goal_id)
                .map(|g| g.description)
                .unwrap_or_default()
        } else {
            session.target.instructions.clone()
        };

        let response = match oracle.continue_execution(&findings, &objective).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "continuation request failed");
                self.events.publish(Event::Error {
                    message: format!("continuation request failed: {err:#}"),
                });
                return;
            }
        };

        let commands = parse_commands(&response);
        let end = is_end_signal(&response);
        if commands.is_empty() {
            if end {
                self.complete_session(&session);
            } else {
                debug!("oracle returned no commands");
            }
            return;
        }
        let added = self.planner.add_tasks_from_llm(&session.goal_id, &commands);
        info!(added = added.len(), end, "oracle continuation added tasks");
        if end {
            self.end_requested.store(true, Ordering::SeqCst);
        }
        self.feed();
    }

    fn complete_session(&self, session: &Session) {
        if !self.transition(&[SessionPhase::Running], SessionPhase::Completed) {
            return;
        }
        self.refresh_progress();
        let success = self.goals.evaluate_goal(&session.goal_id);
        self.goals.complete_goal(&session.goal_id, success);
        let findings = self.findings.len();
        self.events.publish(Event::SessionCompleted { findings });
        info!(
            findings,
            success,
            queue = ?self.queue.summary(),
            agents = ?self.agents.summary(),
            "session completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AutonomyLevel, GoalStatus, TaskStatus};
    use crate::test_support::{ScriptedExecutor, ScriptedOracle, fast_config, target};

    fn orchestrator(
        executor: Arc<ScriptedExecutor>,
        oracle: Option<Arc<ScriptedOracle>>,
    ) -> Orchestrator {
        let oracle = oracle.map(|o| o as Arc<dyn Oracle>);
        Orchestrator::new(fast_config(), executor, oracle).expect("orchestrator")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn url_session_runs_every_template_and_completes() {
        let executor = Arc::new(ScriptedExecutor::new());
        let orch = orchestrator(Arc::clone(&executor), None);
        orch.start(target("https://example.com", ScanMode::Normal))
            .await
            .expect("start");

        let completed = orch
            .run_to_completion(Duration::from_secs(10))
            .await
            .expect("run");
        assert!(completed);
        assert_eq!(orch.phase(), SessionPhase::Completed);

        let plan_id = orch.plan_id().expect("plan");
        let tasks = orch.planner().plan_tasks(&plan_id);
        assert!(!tasks.is_empty());
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
        assert_eq!(executor.calls().len(), tasks.len());
        assert_eq!(orch.findings().len(), tasks.len());

        let goal = orch
            .goals()
            .get_goal(&orch.root_goal_id().expect("goal"))
            .expect("goal");
        assert_eq!(goal.status, GoalStatus::Completed);
        assert!((goal.progress - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_workers_finish_root_goal_with_every_finding() {
        for _ in 0..5 {
            let executor = Arc::new(ScriptedExecutor::new());
            let orch = orchestrator(Arc::clone(&executor), None);
            orch.add_agent("Agent-1").expect("agent 1");
            orch.add_agent("Agent-2").expect("agent 2");
            orch.start(target("example.com", ScanMode::Normal))
                .await
                .expect("start");
            assert!(
                orch.run_to_completion(Duration::from_secs(10))
                    .await
                    .expect("run")
            );

            let goal = orch
                .goals()
                .get_goal(&orch.root_goal_id().expect("goal"))
                .expect("goal");
            assert_eq!(goal.status, GoalStatus::Completed);
            assert_eq!(goal.findings.len(), executor.calls().len());
            assert_eq!(orch.findings().len(), executor.calls().len());
        }
    }

    /// The control loop never finishes the root goal, so continuation work
    /// lands on a live goal and the goal completes once, after every finding.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn root_goal_stays_active_through_continuation() {
        let executor = Arc::new(ScriptedExecutor::new());
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_continuation("RUN echo extra\n");
        let mut cfg = fast_config();
        cfg.event_capacity = 8192;
        cfg.ota.enabled = true;
        cfg.ota.autonomy = AutonomyLevel::FullAutonomous;
        let orch = Orchestrator::new(
            cfg,
            Arc::clone(&executor) as Arc<dyn Executor>,
            Some(Arc::clone(&oracle) as Arc<dyn Oracle>),
        )
        .expect("orchestrator");
        let mut rx = orch.events().subscribe();
        orch.start(target("10.0.0.1", ScanMode::Normal))
            .await
            .expect("start");
        assert!(
            orch.run_to_completion(Duration::from_secs(10))
                .await
                .expect("run")
        );

        let root = orch.root_goal_id().expect("goal");
        assert_eq!(executor.calls_for("RUN echo extra"), 1);
        let goal = orch.goals().get_goal(&root).expect("goal");
        assert_eq!(goal.status, GoalStatus::Completed);
        assert!((goal.progress - 100.0).abs() < f64::EPSILON);
        assert_eq!(goal.findings.len(), orch.findings().len());

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let completed_at: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Event::GoalCompleted { goal_id } if *goal_id == root))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(completed_at.len(), 1);
        let last_finding = events
            .iter()
            .rposition(|e| matches!(e, Event::FindingRecorded { .. }))
            .expect("findings recorded");
        assert!(last_finding < completed_at[0]);
        assert!(
            events[completed_at[0]..]
                .iter()
                .any(|e| matches!(e, Event::SessionCompleted { .. }))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn feeding_prunes_finished_items_past_retention() {
        let executor = Arc::new(ScriptedExecutor::new());
        let mut cfg = fast_config();
        cfg.worker.retain_finished_items = 0;
        let orch = Orchestrator::new(cfg, Arc::clone(&executor) as Arc<dyn Executor>, None)
            .expect("orchestrator");
        orch.start(target("example.com", ScanMode::Normal))
            .await
            .expect("start");
        assert!(
            orch.run_to_completion(Duration::from_secs(10))
                .await
                .expect("run")
        );

        // Phase 0 items were pruned when phase 2 was fed.
        assert_eq!(executor.calls().len(), 5);
        let queue = orch.queue().summary();
        assert_eq!(queue.total, 2);
        assert_eq!(queue.completed, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_start_is_rejected() {
        let orch = orchestrator(Arc::new(ScriptedExecutor::new()), None);
        orch.start(target("10.0.0.1", ScanMode::Normal))
            .await
            .expect("start");
        let err = orch
            .start(target("10.0.0.2", ScanMode::Normal))
            .await
            .expect_err("second start");
        assert!(err.to_string().contains("already started"));
        orch.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn oracle_plan_commands_join_the_session() {
        let executor = Arc::new(ScriptedExecutor::new());
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_plan("Plan:\nRUN echo planned\nnot a command\n");
        let orch = orchestrator(Arc::clone(&executor), Some(Arc::clone(&oracle)));
        orch.start(target("example.com", ScanMode::Stealth))
            .await
            .expect("start");
        assert!(
            orch.run_to_completion(Duration::from_secs(15))
                .await
                .expect("run")
        );

        assert_eq!(executor.calls_for("RUN echo planned"), 1);
        let requests = oracle.plan_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target, "example.com");
        assert_eq!(requests[0].mode, ScanMode::Stealth);
        assert!(oracle.continuation_calls() >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn paused_session_dispatches_nothing_until_resumed() {
        let executor = Arc::new(ScriptedExecutor::new());
        let orch = orchestrator(Arc::clone(&executor), None);
        orch.start(target("10.0.0.1", ScanMode::Normal))
            .await
            .expect("start");
        assert!(orch.pause());
        assert!(!orch.pause());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let during_pause = executor.calls().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(executor.calls().len(), during_pause);

        assert!(orch.resume());
        assert!(
            orch.run_to_completion(Duration::from_secs(10))
                .await
                .expect("run")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_before_completion_reports_stopped() {
        let executor = Arc::new(ScriptedExecutor::with_delay(Duration::from_millis(200)));
        let orch = orchestrator(executor, None);
        orch.start(target("example.com", ScanMode::Normal))
            .await
            .expect("start");
        assert!(orch.stop().await);
        assert_eq!(orch.phase(), SessionPhase::Stopped);
        assert_eq!(orch.status().agents.running_agents, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn removing_a_fed_item_skips_its_task() {
        // One slow agent keeps the remaining bootstrap items pending.
        let executor = Arc::new(ScriptedExecutor::with_delay(Duration::from_millis(100)));
        let orch = orchestrator(executor, None);
        orch.start(target("example.com", ScanMode::Normal))
            .await
            .expect("start");
        assert!(orch.pause());
        let item = orch
            .queue()
            .all()
            .into_iter()
            .rev()
            .find(|item| item.status == QueueStatus::Pending)
            .expect("pending item");

        let reply = orch.handle_queue_command(&format!("rm {}", item.index));
        assert_eq!(reply, format!("Removed item {}", item.index));
        let skipped: Vec<String> = orch
            .planner()
            .plan_tasks(&orch.plan_id().expect("plan"))
            .into_iter()
            .filter(|t| t.status == TaskStatus::Skipped)
            .map(|t| t.command)
            .collect();
        assert_eq!(skipped, vec![item.command]);

        assert!(orch.resume());
        assert!(
            orch.run_to_completion(Duration::from_secs(10))
                .await
                .expect("run")
        );
    }

    #[tokio::test]
    async fn status_serializes_before_start() {
        let orch = orchestrator(Arc::new(ScriptedExecutor::new()), None);
        let status = orch.status();
        assert_eq!(status.phase, SessionPhase::Idle);
        assert!(status.target.is_none());
        let json = serde_json::to_value(&status).expect("json");
        assert_eq!(json["phase"], "idle");
        assert!(
            orch.run_to_completion(Duration::from_millis(10))
                .await
                .is_err()
        );
    }
}
