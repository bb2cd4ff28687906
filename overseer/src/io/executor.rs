//! Executor seam between the orchestration core and command execution.
//!
//! The core never runs commands itself. Production sessions use
//! [`ShellExecutor`]; tests use scripted executors that return canned outcomes
//! without spawning processes.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, instrument};

use crate::core::commands::RUN_PREFIX;
use crate::core::types::AgentId;
use crate::io::config::ExecutorConfig;
use crate::io::process::run_command_with_timeout;

/// Exit code reported for commands killed by the timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub output: String,
    pub error: String,
}

impl ExecOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: output.into(),
            error: String::new(),
        }
    }

    pub fn failure(exit_code: i32, error: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: String::new(),
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one command on behalf of an agent.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, agent_id: AgentId, command: &str) -> Result<ExecOutcome>;
}

/// Executes commands through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ShellExecutor {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(Duration::from_secs(config.timeout_secs), config.output_limit_bytes)
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    #[instrument(skip_all, fields(agent_id = agent_id, timeout_secs = self.timeout.as_secs()))]
    async fn execute(&self, agent_id: AgentId, command: &str) -> Result<ExecOutcome> {
        let script = command.strip_prefix(RUN_PREFIX).unwrap_or(command);
        info!(script, "executing command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);

        let out = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes).await?;
        let mut error = out.stderr_lossy();
        let exit_code = if out.timed_out {
            error.push_str(&format!("timed out after {}s", self.timeout.as_secs()));
            TIMEOUT_EXIT_CODE
        } else {
            out.exit_code.unwrap_or(-1)
        };
        Ok(ExecOutcome {
            exit_code,
            output: out.stdout_lossy(),
            error,
        })
    }
}
