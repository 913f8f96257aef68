//! taskboard - filesystem task coordination for autonomous agents
//!
//! Operator CLI over the task store: create tasks, submit plans, report
//! progress, close tasks and inspect locks.

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use taskboard::lock::LockStatus;
use taskboard::plan::CheckboxStatus;
use taskboard::task::{SyncReport, TaskSnapshot};
use taskboard::{
    CompletionRequest, CompletionStatus, ProgressStatus, ProgressUpdate, Result, TaskStore,
    TaskboardConfig, TaskboardError, TodoItem,
};

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(version)]
#[command(about = "Filesystem task coordination for autonomous agents", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Comm directory holding <agent>/<task_id>/ task folders
    #[arg(long, global = true, env = "TASKBOARD_COMM_DIR")]
    comm_dir: Option<PathBuf>,

    /// Explicit configuration file
    #[arg(long, global = true, env = "TASKBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a task and its INIT.md
    Create {
        agent: String,
        task_id: String,

        /// Task description written into INIT.md
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Submit or replace a task's checkbox plan
    Plan {
        agent: String,
        task_id: String,

        /// Plan file ("-" reads stdin)
        #[arg(short, long)]
        file: PathBuf,

        /// Declared number of steps; must match the plan
        #[arg(long)]
        steps: Option<i64>,
    },

    /// Report progress on one plan step
    Progress {
        agent: String,
        task_id: String,

        /// 1-based step number
        step: usize,

        /// pending, in_progress, completed or blocked
        status: ProgressStatus,

        #[arg(short, long, default_value = "")]
        description: String,

        /// What blocks the step (required for blocked)
        #[arg(long)]
        blocker: Option<String>,
    },

    /// Sync a JSON todo list ([{"content", "status"}]) onto the plan
    SyncTodos {
        agent: String,
        task_id: String,

        /// Todo file ("-" reads stdin)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Close a task as DONE or ERROR
    Complete {
        agent: String,
        task_id: String,

        /// DONE or ERROR
        status: CompletionStatus,

        /// What was done, or what failed
        #[arg(short, long)]
        summary: String,

        /// strict, auto_complete, reconcile or force
        #[arg(short, long)]
        mode: Option<String>,

        /// Explanation for an unchecked item, as "Title=explanation"
        #[arg(long = "explain", value_name = "TITLE=TEXT", value_parser = parse_explanation)]
        explanations: Vec<(String, String)>,
    },

    /// Score the evidence behind a task (or the agent's latest active task)
    Verify {
        agent: String,
        task_id: Option<String>,
    },

    /// Show one task
    Status { agent: String, task_id: String },

    /// List tasks
    List { agent: Option<String> },

    /// Inspect or clean up task locks
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },
}

#[derive(Subcommand)]
enum LockAction {
    /// Show the lock on a task
    Check { agent: String, task_id: String },

    /// Remove stale or malformed locks (all tasks unless one is named)
    Cleanup {
        agent: Option<String>,
        #[arg(requires = "agent")]
        task_id: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let json = cli.json;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                let body = serde_json::json!({
                    "error": { "code": e.code().as_str(), "message": e.to_string() }
                });
                println!("{body}");
            } else {
                eprintln!("{} [{}] {}", "Error:".red().bold(), e.code(), e);
            }
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn init_tracing(verbose: bool, log_json: bool) {
    let default = if verbose { "taskboard=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run(cli: Cli) -> Result<()> {
    let (config, source) = TaskboardConfig::load(cli.config.as_deref(), cli.comm_dir.as_deref())?;
    tracing::debug!(source = ?source, "Using configuration");
    let store = TaskStore::from_config(&config)?;
    let json = cli.json;

    match cli.command {
        Commands::Create {
            agent,
            task_id,
            description,
        } => {
            let paths = store.create(&agent, &task_id, &description)?;
            emit(json, &serde_json::json!({ "created": paths.to_string(), "dir": paths.dir() }), || {
                println!("{} Created {}", "OK".green().bold(), paths);
            })
        }

        Commands::Plan {
            agent,
            task_id,
            file,
            steps,
        } => {
            let plan = read_input(&file)?;
            let submission = store.write_plan(&agent, &task_id, &plan, steps)?;
            emit(json, &submission, || {
                println!(
                    "{} Plan with {} steps written for {}/{}",
                    "OK".green().bold(),
                    submission.step_count,
                    agent,
                    task_id
                );
                print_warnings(&submission.warnings);
            })
        }

        Commands::Progress {
            agent,
            task_id,
            step,
            status,
            description,
            blocker,
        } => {
            let update = ProgressUpdate {
                step,
                status,
                description,
                blocker,
            };
            let receipt = store.report_progress(&agent, &task_id, &update)?;
            emit(json, &receipt, || {
                println!(
                    "{} Step {} '{}' is {} ({}/{} complete)",
                    "OK".green().bold(),
                    receipt.step,
                    receipt.title,
                    receipt.checkbox,
                    receipt.completed_steps,
                    receipt.total_steps
                );
                if let Some(blocker) = &receipt.blocker {
                    println!("  {} {}", "Blocked:".yellow().bold(), blocker);
                }
            })
        }

        Commands::SyncTodos {
            agent,
            task_id,
            file,
        } => {
            let todos: Vec<TodoItem> = serde_json::from_str(&read_input(&file)?).map_err(|e| {
                TaskboardError::invalid_argument("file", format!("todo list is not valid JSON: {e}"))
            })?;
            let report = store.sync_todos(&agent, &task_id, &todos)?;
            emit(json, &report, || print_sync_report(&report))
        }

        Commands::Complete {
            agent,
            task_id,
            status,
            summary,
            mode,
            explanations,
        } => {
            let mut request = CompletionRequest::new(agent, task_id, status, summary);
            request.reconciliation_mode = mode;
            request.reconciliation_explanations = explanations.into_iter().collect::<HashMap<_, _>>();

            let outcome = store.complete(&request)?;
            emit(json, &outcome, || {
                let label = if outcome.is_error {
                    "ERROR".red().bold()
                } else {
                    "DONE".green().bold()
                };
                println!("{} {}/{} closed", label, request.agent, request.task_id);
                println!("\n{}", outcome.summary);
                if !outcome.recommendations.is_empty() {
                    println!("\n{}", "Recommendations:".bold());
                    for rec in &outcome.recommendations {
                        println!("  - {rec}");
                    }
                }
            })
        }

        Commands::Verify { agent, task_id } => {
            let report = match task_id {
                Some(task_id) => store.verify(&agent, &task_id)?,
                None => store.verify_agent(&agent)?,
            };
            emit(json, &report, || {
                let verdict = if report.success {
                    "PASS".green().bold()
                } else {
                    "FAIL".red().bold()
                };
                println!(
                    "{} {}% confidence (threshold {}%)",
                    verdict, report.confidence, report.threshold
                );
                print_warnings(&report.warnings);
                println!("{}", report.recommendation);
            })
        }

        Commands::Status { agent, task_id } => {
            let snapshot = store.snapshot(&agent, &task_id)?;
            emit(json, &snapshot, || print_snapshot(&snapshot))
        }

        Commands::List { agent } => {
            let tasks = store.list(agent.as_deref())?;
            emit(json, &tasks, || {
                if tasks.is_empty() {
                    println!("No tasks under {}", store.comm_root().display());
                }
                for task in &tasks {
                    println!("{:<24} {:<28} {}", task.agent, task.task_id, task.status);
                }
            })
        }

        Commands::Lock { action } => match action {
            LockAction::Check { agent, task_id } => {
                let status = store.check_lock(&agent, &task_id)?;
                emit(json, &status, || print_lock(&status))
            }
            LockAction::Cleanup { agent, task_id } => {
                let target = match (&agent, &task_id) {
                    (Some(a), Some(t)) => Some((a.as_str(), t.as_str())),
                    (Some(_), None) => {
                        return Err(TaskboardError::invalid_argument(
                            "task_id",
                            "name both the agent and the task, or neither",
                        ))
                    }
                    _ => None,
                };
                let removed = store.cleanup_locks(target)?;
                emit(json, &removed, || {
                    println!("{} Removed {} stale lock(s)", "OK".green().bold(), removed.len());
                    for path in &removed {
                        println!("  - {}", path.display());
                    }
                })
            }
        },
    }
}

/// Print `value` as JSON, or run the human renderer.
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn parse_explanation(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((title, text)) if !title.trim().is_empty() => {
            Ok((title.trim().to_string(), text.trim().to_string()))
        }
        _ => Err(format!("expected TITLE=TEXT, got '{raw}'")),
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
}

fn print_sync_report(report: &SyncReport) {
    println!(
        "{} {} todo(s) matched, {} checkbox(es) changed",
        "OK".green().bold(),
        report.matched.len(),
        report.changed_count()
    );
    for m in &report.matched {
        println!("  {} -> {} ({:.2}, {})", m.todo, m.title, m.score, m.status);
    }
    for u in &report.unmatched {
        match &u.suggestion {
            Some(s) => println!(
                "  {} {} (did you mean '{}'? {:.2})",
                "unmatched:".yellow(),
                u.todo,
                s.title,
                s.score
            ),
            None => println!("  {} {}", "unmatched:".yellow(), u.todo),
        }
    }
    print_warnings(&report.warnings);
}

fn print_snapshot(snapshot: &TaskSnapshot) {
    println!(
        "{}/{}: {} ({}/{} steps)",
        snapshot.agent.bold(),
        snapshot.task_id.bold(),
        snapshot.status,
        snapshot.completed_steps,
        snapshot.total_steps
    );
    for item in &snapshot.items {
        let marker = match item.status {
            CheckboxStatus::Complete => "[x]".green(),
            CheckboxStatus::InProgress => "[~]".yellow(),
            CheckboxStatus::Pending => "[ ]".normal(),
        };
        println!("{}{} {}", "  ".repeat(item.indent_level + 1), marker, item.title);
    }
    println!("  progress reports: {}", snapshot.progress_reports);
    print_lock(&snapshot.lock);
    print_warnings(&snapshot.warnings);
}

fn print_lock(status: &LockStatus) {
    match (&status.lock_info, status.is_locked) {
        (_, false) => println!("  lock: {}", "free".green()),
        (Some(info), true) => println!(
            "  lock: {} by '{}' (pid {}){}",
            "held".yellow(),
            info.tool,
            info.pid,
            if status.is_stale { " [stale]" } else { "" }
        ),
        (None, true) => println!("  lock: {}", "malformed [stale]".red()),
    }
}
