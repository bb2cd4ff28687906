//! Session configuration stored as TOML.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{AutonomyLevel, SafetyMode, ScanMode};

/// Overseer configuration (TOML).
///
/// Missing fields take their defaults, so a partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OverseerConfig {
    /// Upper bound on concurrently registered agents.
    pub max_agents: usize,

    /// Failed completions before a task is failed for good.
    pub max_retries: u32,

    /// Events buffered per lagging subscriber.
    pub event_capacity: usize,

    pub worker: WorkerConfig,
    pub ota: OtaSettings,
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Pause after each dispatched command.
    pub dispatch_delay_ms: u64,
    /// Same, for stealth sessions.
    pub stealth_dispatch_delay_ms: u64,
    /// Pause when there is nothing to claim.
    pub idle_delay_ms: u64,
    pub shutdown_timeout_secs: u64,
    /// Finished queue items kept before the next feed prunes them.
    pub retain_finished_items: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dispatch_delay_ms: 100,
            stealth_dispatch_delay_ms: 500,
            idle_delay_ms: 1_000,
            shutdown_timeout_secs: 5,
            retain_finished_items: 1_000,
        }
    }
}

impl WorkerConfig {
    pub fn dispatch_delay(&self, mode: ScanMode) -> Duration {
        match mode {
            ScanMode::Stealth => Duration::from_millis(self.stealth_dispatch_delay_ms),
            ScanMode::Normal | ScanMode::Aggressive => {
                Duration::from_millis(self.dispatch_delay_ms)
            }
        }
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OtaSettings {
    pub enabled: bool,
    pub autonomy: AutonomyLevel,
    pub safety: SafetyMode,
    /// Hard cap on iterations per run.
    pub max_iterations: u32,
    pub loop_delay_ms: u64,
    pub pause_poll_ms: u64,
    pub error_backoff_ms: u64,
    pub stop_timeout_secs: u64,
    /// Entries kept per observation/thought/action history.
    pub history_limit: usize,
}

impl Default for OtaSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            autonomy: AutonomyLevel::Supervised,
            safety: SafetyMode::Moderate,
            max_iterations: 100,
            loop_delay_ms: 1_000,
            pause_poll_ms: 500,
            error_backoff_ms: 2_000,
            stop_timeout_secs: 5,
            history_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Wall-clock limit per command.
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for OverseerConfig {
    fn default() -> Self {
        Self {
            max_agents: 10,
            max_retries: 3,
            event_capacity: 256,
            worker: WorkerConfig::default(),
            ota: OtaSettings::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl OverseerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_agents == 0 {
            return Err(anyhow!("max_agents must be > 0"));
        }
        if self.max_retries == 0 {
            return Err(anyhow!("max_retries must be > 0"));
        }
        if self.event_capacity == 0 {
            return Err(anyhow!("event_capacity must be > 0"));
        }
        if self.ota.max_iterations == 0 {
            return Err(anyhow!("ota.max_iterations must be > 0"));
        }
        if self.ota.history_limit == 0 {
            return Err(anyhow!("ota.history_limit must be > 0"));
        }
        if self.executor.timeout_secs == 0 {
            return Err(anyhow!("executor.timeout_secs must be > 0"));
        }
        if self.executor.output_limit_bytes == 0 {
            return Err(anyhow!("executor.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file, falling back to defaults when it is missing.
pub fn load_config(path: &Path) -> Result<OverseerConfig> {
    let cfg = if path.exists() {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
    } else {
        OverseerConfig::default()
    };
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Validate and atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OverseerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
