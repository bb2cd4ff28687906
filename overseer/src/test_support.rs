//! Scripted collaborators and builders for tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::commands::END_SIGNAL;
use crate::core::types::{AgentId, ScanMode};
use crate::io::config::OverseerConfig;
use crate::io::executor::{ExecOutcome, Executor};
use crate::io::oracle::{Oracle, PlanRequest};
use crate::orchestrator::TargetConfig;

#[derive(Debug, Clone)]
enum Step {
    Outcome(ExecOutcome),
    Error(String),
}

/// Executor returning scripted outcomes per command.
///
/// Commands without a script (or whose script ran out) succeed with
/// `"<command> done\n"` as output. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(AgentId, String)>>,
    delay: Option<Duration>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering, to simulate slow commands.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn script<I>(&self, command: &str, outcomes: I)
    where
        I: IntoIterator<Item = ExecOutcome>,
    {
        self.scripts
            .lock()
            .entry(command.to_string())
            .or_default()
            .extend(outcomes.into_iter().map(Step::Outcome));
    }

    /// Make the next call for `command` return an executor error.
    pub fn script_error(&self, command: &str, message: &str) {
        self.scripts
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(Step::Error(message.to_string()));
    }

    pub fn calls(&self) -> Vec<(AgentId, String)> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, command: &str) -> usize {
        self.calls.lock().iter().filter(|(_, c)| c == command).count()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, agent_id: AgentId, command: &str) -> Result<ExecOutcome> {
        self.calls.lock().push((agent_id, command.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let step = self
            .scripts
            .lock()
            .get_mut(command)
            .and_then(VecDeque::pop_front);
        match step {
            Some(Step::Outcome(outcome)) => Ok(outcome),
            Some(Step::Error(message)) => Err(anyhow!(message)),
            None => Ok(ExecOutcome::success(format!("{command} done\n"))),
        }
    }
}

/// Oracle answering from queued responses, `<END!>` once a queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    plans: Mutex<VecDeque<String>>,
    continuations: Mutex<VecDeque<String>>,
    plan_requests: Mutex<Vec<PlanRequest>>,
    continuation_requests: Mutex<Vec<(Vec<String>, String)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_plan(&self, response: &str) {
        self.plans.lock().push_back(response.to_string());
    }

    pub fn push_continuation(&self, response: &str) {
        self.continuations.lock().push_back(response.to_string());
    }

    pub fn plan_requests(&self) -> Vec<PlanRequest> {
        self.plan_requests.lock().clone()
    }

    pub fn continuation_calls(&self) -> usize {
        self.continuation_requests.lock().len()
    }

    /// Findings passed on each continuation call.
    pub fn continuation_findings(&self) -> Vec<Vec<String>> {
        self.continuation_requests
            .lock()
            .iter()
            .map(|(findings, _)| findings.clone())
            .collect()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate_plan(&self, request: &PlanRequest) -> Result<String> {
        self.plan_requests.lock().push(request.clone());
        let next = self.plans.lock().pop_front();
        Ok(next.unwrap_or_else(|| END_SIGNAL.to_string()))
    }

    async fn continue_execution(&self, findings: &[String], objectives: &str) -> Result<String> {
        self.continuation_requests
            .lock()
            .push((findings.to_vec(), objectives.to_string()));
        let next = self.continuations.lock().pop_front();
        Ok(next.unwrap_or_else(|| END_SIGNAL.to_string()))
    }
}

/// Config with millisecond delays and the control loop disabled.
pub fn fast_config() -> OverseerConfig {
    let mut cfg = OverseerConfig::default();
    cfg.worker.dispatch_delay_ms = 1;
    cfg.worker.stealth_dispatch_delay_ms = 2;
    cfg.worker.idle_delay_ms = 5;
    cfg.worker.shutdown_timeout_secs = 2;
    cfg.ota.enabled = false;
    cfg.ota.loop_delay_ms = 5;
    cfg.ota.pause_poll_ms = 5;
    cfg.ota.error_backoff_ms = 5;
    cfg.ota.stop_timeout_secs = 2;
    cfg
}

pub fn target(target: &str, mode: ScanMode) -> TargetConfig {
    TargetConfig::new(target, mode)
}
