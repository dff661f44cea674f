//! `taskloop`: run a natural-language task through the plan–execute–review loop.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;

use taskloop::controller::run_task;
use taskloop::core::types::Task;
use taskloop::exit_codes;
use taskloop::io::config::{AgentConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use taskloop::io::model::build_model;
use taskloop::io::tools::ToolRegistry;
use taskloop::logging;

#[derive(Parser)]
#[command(
    name = "taskloop",
    version,
    about = "Plan, execute and review a task with a language model and a fixed toolbox"
)]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Execute a task and print the response JSON.
    Run {
        /// Task description.
        task: String,
        /// Extra context entry; VALUE is parsed as JSON when possible.
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
        /// Constraint the planner should respect.
        #[arg(long = "constraint", value_name = "TEXT")]
        constraints: Vec<String>,
        /// Also write the response JSON to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the available tools.
    Tools,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run {
            task,
            context,
            constraints,
            output,
        } => cmd_run(&cli.config, task, &context, constraints, output.as_deref()),
        Command::Tools => cmd_tools(&cli.config),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &AgentConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    config_path: &Path,
    task: String,
    context: &[String],
    constraints: Vec<String>,
    output: Option<&Path>,
) -> Result<i32> {
    if task.trim().is_empty() {
        bail!("task must not be empty");
    }
    let cfg = load_config(config_path)?;
    let mut task = Task::new(task);
    for pair in context {
        let (key, value) = parse_context_pair(pair)?;
        task = task.with_context(key, value);
    }
    for constraint in constraints {
        task = task.with_constraint(constraint);
    }

    let model = build_model(&cfg)?;
    let tools = ToolRegistry::from_config(&cfg.tools);
    debug!(tools = ?tools.names(), "running task");
    let response = run_task(model.as_ref(), &tools, &cfg.loop_, task);

    let mut payload = serde_json::to_string_pretty(&response).context("serialize response")?;
    payload.push('\n');
    if let Some(path) = output {
        fs::write(path, &payload).with_context(|| format!("write {}", path.display()))?;
    }
    print!("{payload}");

    Ok(if response.success {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_tools(config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    for tool in ToolRegistry::from_config(&cfg.tools).iter() {
        println!("{}\t{}", tool.name(), tool.description());
    }
    Ok(exit_codes::OK)
}

/// Split `KEY=VALUE`; VALUE becomes JSON if it parses, a string otherwise.
fn parse_context_pair(pair: &str) -> Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("context entry {pair:?} must be KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("context entry {pair:?} has an empty key");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
