//! Oracle seam: the external text generator that proposes commands.
//!
//! Responses follow the `RUN <command>` line protocol in
//! [`crate::core::commands`]; an oracle signals it is done with `<END!>`.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::commands::END_SIGNAL;
use crate::core::target::TargetCategory;
use crate::core::types::ScanMode;

/// Separator line between responses in a script file.
pub const SCRIPT_SEPARATOR: &str = "---";

/// Context for the initial plan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub target: String,
    pub category: TargetCategory,
    pub mode: ScanMode,
    pub instructions: String,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate_plan(&self, request: &PlanRequest) -> Result<String>;

    /// Ask for follow-up work given recent findings and the remaining objective.
    async fn continue_execution(&self, findings: &[String], objectives: &str) -> Result<String>;
}

/// Replays responses from a script, answering `<END!>` once it runs out.
///
/// The first response answers `generate_plan`; each later one answers a
/// `continue_execution` call.
#[derive(Debug, Default)]
pub struct ScriptOracle {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptOracle {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    /// Load responses separated by `---` lines.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read oracle script {}", path.display()))?;
        Ok(Self::new(parse_script(&contents)))
    }

    fn next_response(&self) -> String {
        let next = self.responses.lock().pop_front();
        next.unwrap_or_else(|| END_SIGNAL.to_string())
    }
}

fn parse_script(contents: &str) -> Vec<String> {
    let mut responses = Vec::new();
    let mut current = String::new();
    for line in contents.lines() {
        if line.trim() == SCRIPT_SEPARATOR {
            responses.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.trim().is_empty() {
        responses.push(current);
    }
    responses
}

#[async_trait]
impl Oracle for ScriptOracle {
    async fn generate_plan(&self, request: &PlanRequest) -> Result<String> {
        debug!(
            scan_target = %request.target,
            category = %request.category,
            "scripted plan request"
        );
        Ok(self.next_response())
    }

    async fn continue_execution(&self, findings: &[String], _objectives: &str) -> Result<String> {
        debug!(findings = findings.len(), "scripted continuation request");
        Ok(self.next_response())
    }
}
