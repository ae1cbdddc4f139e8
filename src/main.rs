use std::collections::HashMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crucible::agent::AgentRegistry;
use crucible::audit::JsonlAudit;
use crucible::clog;
use crucible::config::Config;
use crucible::core::{TaskId, TaskStatus};
use crucible::orchestrator::TaskOrchestrator;
use crucible::refine::IterationBudget;
use crucible::storage::{JsonStorage, Storage, DEFAULT_LIST_LIMIT};
use crucible::{Error, Result};

/// Crucible - orchestrated task execution with iterative refinement
#[derive(Parser, Debug)]
#[command(name = "crucible")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CRUCIBLE_DEBUG=1      Enable debug logging (alternative to --debug)\n    ANTHROPIC_API_KEY     API key forwarded to spawned agents")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.crucible/crucible.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a new task with automatic decomposition and constraint parsing
    Create {
        /// Detailed task description including requirements and constraints
        description: String,

        /// Additional context as a JSON object
        #[arg(long)]
        context: Option<String>,
    },

    /// Execute a task with iterative refinement until constraints are met
    Execute {
        /// The task ID to execute
        task_id: String,
    },

    /// Show the current status and progress of a task
    Status {
        /// The task ID
        task_id: String,
    },

    /// Show the final validated output or current iteration results
    Output {
        /// The task ID
        task_id: String,
    },

    /// Run additional refinement iterations with user feedback
    Review {
        /// The task ID
        task_id: String,

        /// User feedback for refinement
        feedback: String,
    },

    /// List tasks with an optional status filter
    List {
        /// Filter by status (pending, in_progress, completed, failed, cancelled)
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of tasks to show
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    crucible::log::init_with_debug(cli.debug);

    let config = Config::load()?;
    config.ensure_dirs()?;

    match cli.command {
        Command::Create {
            description,
            context,
        } => run_create(&config, &description, context.as_deref()),
        Command::Execute { task_id } => run_execute(&config, &task_id).await,
        Command::Status { task_id } => run_status(&config, &task_id),
        Command::Output { task_id } => run_output(&config, &task_id),
        Command::Review { task_id, feedback } => run_review(&config, &task_id, &feedback).await,
        Command::List { status, limit } => run_list(&config, status.as_deref(), limit),
    }
}

fn parse_task_id(raw: &str) -> Result<TaskId> {
    raw.parse()
        .map_err(|_| Error::Validation(format!("invalid task id: {}", raw)))
}

/// The environment is consulted only here; the library takes an explicit
/// pool configuration.
fn build_orchestrator(config: &Config) -> Result<TaskOrchestrator> {
    let mut pool = config.pool.clone();
    if pool.api_key.is_none() {
        pool.api_key = std::env::var("ANTHROPIC_API_KEY").ok();
    }
    let registry = AgentRegistry::from_config(&pool, config.effective_command())?;
    orchestrator_with(config, registry)
}

/// Orchestrator without any agents, for commands that never execute
/// subtasks. Avoids requiring the agent binary to be installed.
fn build_offline_orchestrator(config: &Config) -> Result<TaskOrchestrator> {
    orchestrator_with(config, AgentRegistry::new())
}

fn orchestrator_with(config: &Config, registry: AgentRegistry) -> Result<TaskOrchestrator> {
    let storage = JsonStorage::new(config.tasks_dir()?)?;
    let audit = JsonlAudit::new(Config::logs_dir()?)?;
    let budget = config
        .max_iterations
        .map(IterationBudget::new)
        .unwrap_or_default();

    Ok(TaskOrchestrator::new(
        Arc::new(storage),
        Arc::new(audit),
        Arc::new(registry),
        budget,
    ))
}

fn run_create(config: &Config, description: &str, context: Option<&str>) -> Result<()> {
    let context: HashMap<String, serde_json::Value> = match context {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| Error::Validation(format!("invalid context JSON: {}", err)))?,
        None => HashMap::new(),
    };

    let orchestrator = build_offline_orchestrator(config)?;
    let task = orchestrator.create(description, context)?;

    println!("Task created successfully!\n");
    println!("Task ID: {}", task.id);
    println!("Status: {}", task.status);
    println!("Constraints ({}):", task.constraints.len());
    for constraint in &task.constraints {
        println!("  - {}", constraint);
    }
    println!("Subtasks ({}):", task.subtasks.len());
    for subtask in &task.subtasks {
        println!(
            "  - [{}] {} ({})",
            subtask.id.short(),
            subtask.description,
            subtask.required_capability
        );
    }
    Ok(())
}

async fn run_execute(config: &Config, task_id: &str) -> Result<()> {
    let id = parse_task_id(task_id)?;
    let orchestrator = build_orchestrator(config)?;

    clog!("Executing task {}", id.short());
    let summary = match orchestrator.execute(&id).await? {
        Some(summary) => summary,
        None => {
            println!("Task {} not found", task_id);
            return Ok(());
        }
    };

    println!("Task Execution Complete!\n");
    println!("Status: {}", summary.status);
    println!(
        "Subtasks Completed: {}/{}",
        summary.completed_subtasks, summary.total_subtasks
    );
    println!("\nFinal Output:\n\n{}", summary.final_output);
    Ok(())
}

fn run_status(config: &Config, task_id: &str) -> Result<()> {
    let id = parse_task_id(task_id)?;
    let orchestrator = build_offline_orchestrator(config)?;

    let task = match orchestrator.task(&id)? {
        Some(task) => task,
        None => {
            println!("Task {} not found", task_id);
            return Ok(());
        }
    };

    println!("Task ID: {}", task.id);
    println!("Description: {}", task.description);
    println!("Status: {}", task.status);
    println!("Created: {}", task.created_at.to_rfc3339());
    println!("Subtasks:");
    for subtask in &task.subtasks {
        println!(
            "  - [{}] {} ({}): {}",
            subtask.id.short(),
            subtask.description,
            subtask.required_capability,
            subtask.status
        );
    }
    Ok(())
}

fn run_output(config: &Config, task_id: &str) -> Result<()> {
    let id = parse_task_id(task_id)?;
    let orchestrator = build_offline_orchestrator(config)?;

    let task = match orchestrator.task(&id)? {
        Some(task) => task,
        None => {
            println!("Task {} not found", task_id);
            return Ok(());
        }
    };

    match &task.output {
        Some(output) => println!("Task Output:\n\n{}", output),
        None => {
            println!("Subtask Outputs:\n");
            for subtask in &task.subtasks {
                println!("## {}", subtask.description);
                println!("Status: {}", subtask.status);
                match &subtask.output {
                    Some(output) => println!("Output:\n{}\n", output),
                    None => println!("No output yet\n"),
                }
            }
        }
    }
    Ok(())
}

async fn run_review(config: &Config, task_id: &str, feedback: &str) -> Result<()> {
    let id = parse_task_id(task_id)?;
    let orchestrator = build_orchestrator(config)?;

    let result = match orchestrator.review_and_iterate(&id, feedback).await? {
        Some(result) => result,
        None => {
            println!("Task {} not found", task_id);
            return Ok(());
        }
    };

    println!("Refinement Complete!\n");
    println!("Iterations: {}", result.total_iterations);
    println!("Final Score: {:.2}", result.final_score);
    println!("Success: {}", result.success);
    println!(
        "\nOutput:\n\n{}",
        result.final_output.as_deref().unwrap_or("No output")
    );
    Ok(())
}

fn run_list(config: &Config, status: Option<&str>, limit: usize) -> Result<()> {
    let status = match status {
        Some(raw) => Some(raw.parse::<TaskStatus>()?),
        None => None,
    };

    let storage = JsonStorage::new(config.tasks_dir()?)?;
    let summaries = storage.list(status, limit)?;

    if summaries.is_empty() {
        println!("No tasks found");
        return Ok(());
    }

    println!("Tasks (showing {}):\n", summaries.len());
    for summary in summaries {
        println!("- {}", summary.task_id);
        println!("  Description: {}", summary.description);
        println!("  Status: {}", summary.status);
        println!("  Created: {}", summary.created_at.to_rfc3339());
        println!();
    }
    Ok(())
}
