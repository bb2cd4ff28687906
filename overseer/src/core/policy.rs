//! Approval gate for proposed actions.
//!
//! Precedence (first match decides):
//! 1. `Manual` autonomy always requires approval.
//! 2. `FullAutonomous` autonomy never does, dangerous commands included.
//! 3. `Strict` safety always requires approval.
//! 4. A command matching the dangerous blocklist requires approval.
//! 5. `Supervised` autonomy requires approval for task execution.
//! 6. Everything else is auto-approved.

use serde::{Deserialize, Serialize};

use crate::core::types::{AutonomyLevel, SafetyMode};

/// High-risk command fragments, matched case-insensitively as substrings.
pub const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf",
    "mkfs",
    "dd if=",
    "> /dev/",
    "chmod -R 777",
    ":(){:|:&};:",
    "wget | sh",
    "curl | bash",
    "shutdown",
    "reboot",
    "halt",
];

/// Coarse action class the policy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    /// Runs a command against the target.
    TaskExecution,
    /// Asks the oracle for more work.
    Planning,
}

pub fn is_dangerous(command: &str) -> bool {
    let command = command.to_lowercase();
    DANGEROUS_PATTERNS
        .iter()
        .any(|pattern| command.contains(&pattern.to_lowercase()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub autonomy: AutonomyLevel,
    pub safety: SafetyMode,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            autonomy: AutonomyLevel::Supervised,
            safety: SafetyMode::Moderate,
        }
    }
}

impl ApprovalPolicy {
    pub fn new(autonomy: AutonomyLevel, safety: SafetyMode) -> Self {
        Self { autonomy, safety }
    }

    pub fn requires_approval(&self, class: ActionClass, command: Option<&str>) -> bool {
        match self.autonomy {
            AutonomyLevel::Manual => return true,
            AutonomyLevel::FullAutonomous => return false,
            AutonomyLevel::Supervised
            | AutonomyLevel::SemiAutonomous
            | AutonomyLevel::Autonomous => {}
        }

        if self.safety == SafetyMode::Strict {
            return true;
        }

        if command.is_some_and(is_dangerous) {
            return true;
        }

        self.autonomy == AutonomyLevel::Supervised && class == ActionClass::TaskExecution
    }
}
