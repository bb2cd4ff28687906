//! `overseer` CLI: inspect targets and plans, check the approval policy and
//! run reconnaissance sessions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

use overseer::core::policy::{ActionClass, ApprovalPolicy};
use overseer::core::target::detect_category;
use overseer::core::types::{AutonomyLevel, SafetyMode, ScanMode};
use overseer::events::EventBus;
use overseer::exit_codes;
use overseer::goals::GoalSystem;
use overseer::io::config::{OverseerConfig, load_config, write_config};
use overseer::io::executor::{Executor, ShellExecutor};
use overseer::io::oracle::{Oracle, ScriptOracle};
use overseer::logging;
use overseer::orchestrator::{Orchestrator, TargetConfig};
use overseer::planner::{ExecutionPlan, Planner, SubTask};

const DEFAULT_CONFIG: &str = "overseer.toml";

#[derive(Parser)]
#[command(
    name = "overseer",
    version,
    about = "Multi-agent reconnaissance orchestrator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the category (ip, url, path, domain) of a target.
    Detect { target: String },
    /// Print the bootstrap plan a session would create for a target.
    Plan {
        target: String,
        #[arg(long, default_value = "normal")]
        mode: ScanMode,
    },
    /// Check whether the approval policy gates an action. Exits 3 if it does.
    Check {
        command: String,
        #[arg(long, default_value = "supervised")]
        autonomy: AutonomyLevel,
        #[arg(long, default_value = "moderate")]
        safety: SafetyMode,
        #[arg(long, value_enum, default_value_t = CheckKind::Task)]
        kind: CheckKind,
    },
    /// Write a default config file.
    InitConfig {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run a session against a target until the oracle ends it.
    Run {
        target: String,
        #[arg(long, default_value = "normal")]
        mode: ScanMode,
        /// Agents (and workers) to register.
        #[arg(long, default_value_t = 1)]
        agents: usize,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Oracle responses separated by `---` lines.
        #[arg(long)]
        oracle_script: Option<PathBuf>,
        #[arg(long, default_value = "")]
        instructions: String,
        /// Override the control loop's autonomy level.
        #[arg(long)]
        autonomy: Option<AutonomyLevel>,
        /// Override the control loop's safety mode.
        #[arg(long)]
        safety: Option<SafetyMode>,
        /// Write the goal report here when the session ends.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Write the findings here when the session ends.
        #[arg(long)]
        findings: Option<PathBuf>,
        #[arg(long, default_value_t = 3600)]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CheckKind {
    Task,
    Planning,
}

impl From<CheckKind> for ActionClass {
    fn from(kind: CheckKind) -> Self {
        match kind {
            CheckKind::Task => ActionClass::TaskExecution,
            CheckKind::Planning => ActionClass::Planning,
        }
    }
}

#[derive(Serialize)]
struct PlanPreview {
    category: &'static str,
    plan: ExecutionPlan,
    tasks: Vec<SubTask>,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Detect { target } => {
            println!("{}", detect_category(&target).as_str());
            Ok(exit_codes::OK)
        }
        Command::Plan { target, mode } => cmd_plan(&target, mode),
        Command::Check {
            command,
            autonomy,
            safety,
            kind,
        } => Ok(cmd_check(&command, autonomy, safety, kind)),
        Command::InitConfig { path, force } => cmd_init_config(&path, force),
        Command::Run {
            target,
            mode,
            agents,
            config,
            oracle_script,
            instructions,
            autonomy,
            safety,
            report,
            findings,
            timeout_secs,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(autonomy) = autonomy {
                cfg.ota.autonomy = autonomy;
            }
            if let Some(safety) = safety {
                cfg.ota.safety = safety;
            }
            let args = RunArgs {
                target: TargetConfig {
                    target,
                    mode,
                    instructions,
                },
                agents,
                oracle_script,
                report,
                findings,
                timeout: Duration::from_secs(timeout_secs),
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("build tokio runtime")?;
            runtime.block_on(cmd_run(cfg, args))
        }
    }
}

fn cmd_plan(target: &str, mode: ScanMode) -> Result<i32> {
    let events = EventBus::default();
    let goals = GoalSystem::new(events.clone());
    let planner = Planner::new(events);
    let goal = goals.create_from_objective(&format!("Reconnaissance of {target}"), target, mode);
    let plan = planner.create_plan(&goal, mode);
    let preview = PlanPreview {
        category: detect_category(target).as_str(),
        tasks: planner.plan_tasks(&plan.id),
        plan,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&preview).context("serialize plan")?
    );
    Ok(exit_codes::OK)
}

fn cmd_check(command: &str, autonomy: AutonomyLevel, safety: SafetyMode, kind: CheckKind) -> i32 {
    let policy = ApprovalPolicy::new(autonomy, safety);
    if policy.requires_approval(kind.into(), Some(command)) {
        println!("approval required");
        exit_codes::APPROVAL_REQUIRED
    } else {
        println!("auto-approved");
        exit_codes::OK
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &OverseerConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

struct RunArgs {
    target: TargetConfig,
    agents: usize,
    oracle_script: Option<PathBuf>,
    report: Option<PathBuf>,
    findings: Option<PathBuf>,
    timeout: Duration,
}

async fn cmd_run(cfg: OverseerConfig, args: RunArgs) -> Result<i32> {
    let executor: Arc<dyn Executor> = Arc::new(ShellExecutor::from_config(&cfg.executor));
    let oracle = match &args.oracle_script {
        Some(path) => Some(Arc::new(ScriptOracle::from_file(path)?) as Arc<dyn Oracle>),
        None => None,
    };
    let orchestrator = Orchestrator::new(cfg, executor, oracle)?;
    for i in 1..=args.agents.max(1) {
        if orchestrator.add_agent(&format!("Agent-{i}")).is_none() {
            bail!(
                "cannot register {} agents (max_agents = {})",
                args.agents,
                orchestrator.agents().max_agents()
            );
        }
    }

    orchestrator.start(args.target).await?;
    let completed = orchestrator.run_to_completion(args.timeout).await?;

    if let Some(path) = &args.report {
        orchestrator.export_report(path)?;
        info!(path = %path.display(), "goal report written");
    }
    if let Some(path) = &args.findings {
        orchestrator.export_findings(path)?;
        info!(path = %path.display(), "findings written");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&orchestrator.status()).context("serialize status")?
    );
    Ok(if completed {
        exit_codes::OK
    } else {
        exit_codes::TIMED_OUT
    })
}
