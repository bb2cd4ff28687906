//! Session findings and the short memory context the control loop reads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::types::AgentId;

/// Recent findings the memory context keeps for reasoning.
pub const RECENT_FINDINGS_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn is_urgent(self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub agent_id: AgentId,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub raw_output: String,
}

impl Finding {
    /// Finding derived from a successful command's output.
    ///
    /// Title carries the first 50 characters of the command, description the
    /// first 500 characters of the output.
    pub fn from_command_output(agent_id: AgentId, command: &str, output: &str) -> Self {
        let head: String = command.chars().take(50).collect();
        Self {
            severity: Severity::Info,
            title: format!("Command Result: {head}"),
            description: output.chars().take(500).collect(),
            agent_id,
            timestamp: Utc::now(),
            raw_output: output.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemorySummary {
    pub total_findings: usize,
    pub recent_findings: usize,
    pub by_severity: BTreeMap<Severity, usize>,
}

/// Session memory the control loop reads and records findings into.
pub trait MemoryContext: Send + Sync {
    fn summary(&self) -> MemorySummary;
    /// Most recent findings, oldest first, at most `limit`.
    fn recent_findings(&self, limit: usize) -> Vec<Finding>;
    fn record_finding(&self, finding: Finding);
}

/// Append-only findings store.
#[derive(Debug, Default)]
pub struct FindingLog {
    findings: Mutex<Vec<Finding>>,
}

impl FindingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, finding: Finding) {
        self.findings.lock().push(finding);
    }

    pub fn all(&self) -> Vec<Finding> {
        self.findings.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.findings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.lock().is_empty()
    }

    /// Descriptions of the latest findings, used as oracle context.
    pub fn recent_descriptions(&self, limit: usize) -> Vec<String> {
        self.recent_findings(limit)
            .into_iter()
            .map(|f| f.description)
            .collect()
    }
}

impl MemoryContext for FindingLog {
    fn summary(&self) -> MemorySummary {
        let findings = self.findings.lock();
        let mut by_severity = BTreeMap::new();
        for finding in findings.iter() {
            *by_severity.entry(finding.severity).or_insert(0) += 1;
        }
        MemorySummary {
            total_findings: findings.len(),
            recent_findings: findings.len().min(RECENT_FINDINGS_LIMIT),
            by_severity,
        }
    }

    fn recent_findings(&self, limit: usize) -> Vec<Finding> {
        let findings = self.findings.lock();
        let start = findings.len().saturating_sub(limit.min(RECENT_FINDINGS_LIMIT));
        findings[start..].to_vec()
    }

    fn record_finding(&self, finding: Finding) {
        self.record(finding);
    }
}
