//! JSON exports of goal state and findings.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::findings::Finding;
use crate::goals::{Goal, GoalSummary, GoalSystem};

#[derive(Debug, Clone, Serialize)]
pub struct GoalReport {
    pub generated_at: DateTime<Utc>,
    pub goals: BTreeMap<String, Goal>,
    pub summary: GoalSummary,
}

impl GoalReport {
    pub fn capture(goals: &GoalSystem) -> Self {
        Self {
            generated_at: Utc::now(),
            goals: goals.snapshot(),
            summary: goals.summary(),
        }
    }
}

pub fn export_report(path: &Path, goals: &GoalSystem) -> Result<()> {
    let report = GoalReport::capture(goals);
    super::write_json(path, &report).with_context(|| format!("export report {}", path.display()))?;
    info!(path = %path.display(), goals = report.goals.len(), "report exported");
    Ok(())
}

pub fn export_findings(path: &Path, findings: &[Finding]) -> Result<()> {
    super::write_json(path, &findings)
        .with_context(|| format!("export findings {}", path.display()))?;
    info!(path = %path.display(), findings = findings.len(), "findings exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ScanMode;
    use crate::events::EventBus;

    #[test]
    fn report_contains_goal_map_and_summary() {
        let goals = GoalSystem::new(EventBus::new(16));
        let goal = goals.create_from_objective("recon", "example.com", ScanMode::Normal);
        goals.start_goal(&goal.id);
        goals.complete_goal(&goal.id, true);

        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out").join("report.json");
        export_report(&path, &goals).expect("export");

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(json["goals"][&goal.id]["status"], "completed");
        assert_eq!(json["goals"][&goal.id]["metadata"]["target"], "example.com");
        assert_eq!(json["summary"]["completed"], 1);
        assert_eq!(json["summary"]["success_rate"], 100.0);
    }

    #[test]
    fn findings_export_is_a_json_list() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("findings.json");
        let findings = vec![Finding::from_command_output(
            2,
            "RUN whois example.com",
            "Registrar: X",
        )];
        export_findings(&path, &findings).expect("export");

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        let list = json.as_array().expect("array");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["agent_id"], 2);
        assert_eq!(list[0]["title"], "Command Result: RUN whois example.com");
        for key in ["severity", "title", "description", "agent_id", "timestamp"] {
            assert!(list[0].get(key).is_some(), "missing {key}");
        }
    }
}
