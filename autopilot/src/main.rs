//! Goal-driven screen autopilot CLI.
//!
//! `plan` shows how a goal decomposes, `run` drives the executor loop against
//! recorded screens with a dry-run actuator, and `rules` checks a reflex
//! rules file against a hand-written state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use autopilot::core::plan::Task;
use autopilot::core::rules::{RuleEngine, RuleOutcome};
use autopilot::events::{AgentEvent, EventBus, StopReason};
use autopilot::executor::{Executor, ExecutorSettings};
use autopilot::exit_codes;
use autopilot::io::actuator::{DryRunActuator, HumanizedActuator};
use autopilot::io::config::{AgentConfig, DEFAULT_CONFIG_PATH, HumanizationConfig, load_config};
use autopilot::io::decision_log::DecisionLog;
use autopilot::io::llm::OpenAiChat;
use autopilot::io::oracle::{DecisionOracle, LlmOracle};
use autopilot::io::perception::ReplayPerception;
use autopilot::io::rules_file::{load_rules, parse_state};
use autopilot::logging;
use autopilot::planner::GoalPlanner;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "autopilot", version, about = "Goal-driven screen autopilot")]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decompose a goal into tasks and print them.
    Plan { goal: String },
    /// Execute a goal against recorded screens (dry-run input).
    Run {
        goal: String,
        /// Directory of `*.json` snapshots replayed in name order.
        #[arg(long)]
        replay: PathBuf,
        /// Reflex rules file (TOML template).
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Move and click instantly, without jitter or pauses.
        #[arg(long)]
        no_humanize: bool,
    },
    /// Evaluate a rules file against `KEY=VALUE` state and print each outcome.
    Rules {
        #[arg(long)]
        file: PathBuf,
        state: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    match cli.command {
        Command::Plan { goal } => cmd_plan(&cfg, &goal).await,
        Command::Run {
            goal,
            replay,
            rules,
            no_humanize,
        } => cmd_run(&cfg, &goal, &replay, rules.as_deref(), no_humanize).await,
        Command::Rules { file, state } => cmd_rules(&cfg, &file, &state),
    }
}

fn build_oracle(cfg: &AgentConfig) -> Result<Arc<dyn DecisionOracle>> {
    let chat = OpenAiChat::from_config(&cfg.llm).context("configure LLM client")?;
    Ok(Arc::new(LlmOracle::new(
        Arc::new(chat),
        cfg.behavior.risk_level.clone(),
        cfg.llm.timeout(),
    )))
}

async fn cmd_plan(cfg: &AgentConfig, goal: &str) -> Result<i32> {
    let planner = GoalPlanner::new(build_oracle(cfg)?);
    let tasks = planner.set_goal(goal).await;
    print_tasks(&tasks);
    Ok(exit_codes::OK)
}

async fn cmd_run(
    cfg: &AgentConfig,
    goal: &str,
    replay: &Path,
    rules_path: Option<&Path>,
    no_humanize: bool,
) -> Result<i32> {
    let perception = ReplayPerception::from_dir(replay)?;
    let rules = match rules_path {
        Some(path) => RuleEngine::with_rules(&load_rules(path, cfg)?),
        None => RuleEngine::new(),
    };
    let humanization = if no_humanize {
        HumanizationConfig {
            mouse_speed: 0.0,
            jitter: false,
        }
    } else {
        cfg.behavior.humanization.clone()
    };

    let planner = GoalPlanner::new(build_oracle(cfg)?);
    print_tasks(&planner.set_goal(goal).await);

    let mut executor = Executor::new(
        planner,
        perception,
        HumanizedActuator::new(DryRunActuator::new(), humanization),
    )
    .with_rules(rules)
    .with_events(EventBus::new(cfg.executor.event_capacity))
    .with_settings(ExecutorSettings::from(&cfg.executor));
    if cfg.log.enabled {
        let log = DecisionLog::open(&cfg.log.dir)
            .await
            .with_context(|| format!("open decision log {}", cfg.log.dir.display()))?;
        executor = executor.with_decision_log(log);
    }

    let mut rx = executor.events().subscribe();
    let handle = executor.spawn();

    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(AgentEvent::Log(line)) => println!("{line}"),
                Ok(AgentEvent::TaskListChanged(tasks)) => print_tasks(&tasks),
                Ok(AgentEvent::Stopped(_)) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => eprintln!("({skipped} events skipped)"),
            }
        }
    });

    let cancel = handle.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = handle.join().await?;
    interrupt.abort();
    printer.await.context("event printer panicked")?;

    println!(
        "{} completed, {} failed, {} decision cycles",
        outcome.tasks_completed, outcome.tasks_failed, outcome.cycles
    );
    Ok(match outcome.stop {
        StopReason::PlanExhausted => exit_codes::OK,
        StopReason::Cancelled => exit_codes::STOPPED,
    })
}

fn cmd_rules(cfg: &AgentConfig, file: &Path, assignments: &[String]) -> Result<i32> {
    let engine = RuleEngine::with_rules(&load_rules(file, cfg)?);
    let state = parse_state(assignments)?;
    let mut matched = false;
    for report in engine.explain(&state) {
        let outcome = match &report.outcome {
            RuleOutcome::Matched if !matched => {
                matched = true;
                "matched (fires)".to_string()
            }
            RuleOutcome::Matched => "matched (shadowed)".to_string(),
            RuleOutcome::NotMatched => "not matched".to_string(),
            RuleOutcome::Malformed(reason) => format!("malformed: {reason}"),
        };
        println!("#{} {}: {}", report.index, report.action, outcome);
    }
    Ok(if matched {
        exit_codes::OK
    } else {
        exit_codes::NO_MATCH
    })
}

fn print_tasks(tasks: &[Task]) {
    for (index, task) in tasks.iter().enumerate() {
        println!("{:>2}. [{}] {}", index + 1, task.status.as_str(), task.description);
    }
}
