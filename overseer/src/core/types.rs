//! Closed status, priority and mode types shared by every component.
//!
//! Each enum is the single source of truth for its field: consumers match on
//! it exhaustively and serialize it as a snake_case string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Worker identity allocated by the agent registry. Never reused in a session.
pub type AgentId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Paused,
}

impl GoalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Failed)
    }
}

/// Goal priority. Ordering follows urgency: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    ShortTerm,
    LongTerm,
    Milestone,
}

/// How a success criterion interprets its current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Met when `current >= target` (target defaults to 0).
    Threshold,
    /// Met when `current > 0`.
    Boolean,
    /// Met when `current >= target` (target defaults to 1).
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Recon,
    Scan,
    Enumerate,
    Analyze,
    Exploit,
    Report,
    Custom,
}

impl TaskType {
    /// Phase bucket a task of this type lands in: recon=0, scan=1, enumerate=2, rest=3.
    pub fn phase(self) -> u32 {
        match self {
            TaskType::Recon => 0,
            TaskType::Scan => 1,
            TaskType::Enumerate => 2,
            TaskType::Analyze | TaskType::Exploit | TaskType::Report | TaskType::Custom => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// Claimed by someone (queued for a worker or actively running).
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl QueueStatus {
    /// Forward-only lifecycle: pending -> running -> {completed, failed}.
    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (QueueStatus::Pending, QueueStatus::Running)
                | (QueueStatus::Running, QueueStatus::Completed)
                | (QueueStatus::Running, QueueStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Running => "running",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
}

/// How much human approval is required before actions execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    Manual,
    Supervised,
    SemiAutonomous,
    Autonomous,
    FullAutonomous,
}

impl FromStr for AutonomyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "manual" => Ok(AutonomyLevel::Manual),
            "supervised" => Ok(AutonomyLevel::Supervised),
            "semi_autonomous" => Ok(AutonomyLevel::SemiAutonomous),
            "autonomous" => Ok(AutonomyLevel::Autonomous),
            "full_autonomous" => Ok(AutonomyLevel::FullAutonomous),
            other => Err(format!("unknown autonomy level '{other}'")),
        }
    }
}

/// Independent dial that can force stricter approval regardless of autonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    Strict,
    Moderate,
    Permissive,
}

impl FromStr for SafetyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SafetyMode::Strict),
            "moderate" => Ok(SafetyMode::Moderate),
            "permissive" => Ok(SafetyMode::Permissive),
            other => Err(format!("unknown safety mode '{other}'")),
        }
    }
}

/// Scan posture for a session. Stealth and aggressive are exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    Normal,
    Stealth,
    Aggressive,
}

impl ScanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanMode::Normal => "normal",
            ScanMode::Stealth => "stealth",
            ScanMode::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(ScanMode::Normal),
            "stealth" => Ok(ScanMode::Stealth),
            "aggressive" => Ok(ScanMode::Aggressive),
            other => Err(format!("unknown scan mode '{other}'")),
        }
    }
}
