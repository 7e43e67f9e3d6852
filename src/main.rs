//! PromptChain CLI Entry Point
//!
//! Provides command-line interface for prompt chain execution.
//!
//! # Usage
//!
//! ```bash
//! # Execute a workflow through a completion command
//! promptchain chain.yaml --provider "llm -m {model}"
//!
//! # Dry run mode (validate and preview steps)
//! promptchain chain.yaml --dry-run
//!
//! # Price calls and keep a snapshot of the run records
//! promptchain chain.yaml --provider "llm -m {model}" \
//!     --pricing pricing.yaml --state-file runs.json
//! ```

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use promptchain::execution::{Engine, DEFAULT_JUDGE_MODEL};
use promptchain::monitoring::{EventKind, ExecutionTimeline, RunEvent};
use promptchain::provider::{CommandProvider, PricingTable};
use promptchain::storage::{InMemoryStore, Store};
use promptchain::workflow::{
    load_workflow, validate_workflow, RunStatus, StepExecutionStatus, Workflow,
};
use promptchain::{APP_NAME, VERSION};

/// Default workflow file used when none is specified.
const DEFAULT_WORKFLOW: &str = "workflow.yaml";

/// Environment variable consulted when `--provider` is not given.
const PROVIDER_ENV: &str = "PROMPTCHAIN_PROVIDER";

/// Width of output previews in event lines.
const PREVIEW_CHARS: usize = 80;

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    workflow_path: String,
    provider_command: Option<String>,
    judge_model: String,
    pricing_path: Option<String>,
    retry_delay: Duration,
    state_file: Option<String>,
    dry_run: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_path: DEFAULT_WORKFLOW.to_string(),
            provider_command: env::var(PROVIDER_ENV).ok(),
            judge_model: DEFAULT_JUDGE_MODEL.to_string(),
            pricing_path: None,
            retry_delay: promptchain::execution::DEFAULT_RETRY_DELAY,
            state_file: None,
            dry_run: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("LLM Prompt Chain Execution Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: promptchain [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>        Path to workflow YAML file");
    println!();
    println!("Options:");
    println!("  --provider CMD         Completion command, run with `sh -c`; `{{model}}`");
    println!("                         is replaced by the step's model (env: {})", PROVIDER_ENV);
    println!("  --judge-model M        Model judging `llm` criteria (default: {})", DEFAULT_JUDGE_MODEL);
    println!("  --pricing FILE         YAML table of per-model prices per 1k tokens");
    println!("  --retry-delay-ms N     Delay between attempts of a step (default: 1000)");
    println!("  --state-file FILE      Load and save run records as a JSON snapshot");
    println!("  --dry-run              Validate and preview steps without execution");
    println!("  --verbose              Enable debug logging");
    println!("  --help                 Show this help message");
    println!("  --version              Show version information");
    println!();
    println!("Examples:");
    println!("  promptchain chain.yaml --provider \"llm -m {{model}}\"");
    println!("  promptchain chain.yaml --dry-run");
    println!("  promptchain chain.yaml --provider ./complete.sh --pricing pricing.yaml");
}

/// Returns the value following a flag, advancing the cursor.
fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires an argument", flag))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--provider" => {
                config.provider_command = Some(flag_value(args, &mut i, arg)?.to_string());
            }
            "--judge-model" => {
                config.judge_model = flag_value(args, &mut i, arg)?.to_string();
            }
            "--pricing" => {
                config.pricing_path = Some(flag_value(args, &mut i, arg)?.to_string());
            }
            "--state-file" => {
                config.state_file = Some(flag_value(args, &mut i, arg)?.to_string());
            }
            "--retry-delay-ms" => {
                let value = flag_value(args, &mut i, arg)?;
                let millis: u64 = value
                    .parse()
                    .map_err(|_| format!("Invalid retry delay: {}", value))?;
                config.retry_delay = Duration::from_millis(millis);
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                // Positional argument
                match positional_index {
                    0 => config.workflow_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    if !config.dry_run && config.provider_command.is_none() {
        return Err(format!("--provider is required (or set {})", PROVIDER_ENV));
    }

    Ok(config)
}

/// Prints the steps of a workflow without executing them.
fn print_preview(workflow: &Workflow) {
    println!("{} ({} steps)", workflow.name.bold(), workflow.steps.len());
    if !workflow.description.is_empty() {
        println!("{}", workflow.description.dimmed());
    }
    println!();

    for (index, step) in workflow.steps.iter().enumerate() {
        println!("{:>3}. {} [{}]", index + 1, step.name.cyan(), step.model);
        println!(
            "     criterion: {} {}",
            step.criteria_type,
            step.criteria_value
        );
        println!(
            "     retries: {}, context: {}{}",
            step.retry_limit,
            step.context_mode,
            if step.uses_context_placeholder() { " (inline)" } else { "" }
        );
    }
    println!();
}

/// Opens the run store, restoring a previous snapshot when one exists.
fn open_store(state_file: Option<&str>) -> Result<InMemoryStore, Box<dyn std::error::Error>> {
    let Some(path) = state_file else {
        return Ok(InMemoryStore::new());
    };

    if Path::new(path).exists() {
        info!("Restoring state from {}", path);
        Ok(InMemoryStore::load(path)?)
    } else {
        info!("State will be saved to {}", path);
        Ok(InMemoryStore::new().with_snapshot(path))
    }
}

/// Shortens text to one line for event output.
fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS || text.lines().nth(1).is_some() {
        let head: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}

/// Prints one event as a colored progress line.
fn print_event(event: &RunEvent, step_names: &HashMap<String, String>) {
    let name_of = |id: &str| step_names.get(id).cloned().unwrap_or_else(|| id.to_string());

    match &event.kind {
        EventKind::StepStarted {
            step_name,
            step_index,
            ..
        } => {
            println!("{} {}", format!("[{}]", step_index + 1).bold(), step_name.cyan().bold());
        }
        EventKind::StepAttempt {
            attempt,
            max_attempts,
            ..
        } => {
            println!("    attempt {}/{}", attempt, max_attempts);
        }
        EventKind::StepResponse {
            output,
            tokens,
            cost,
            ..
        } => {
            println!(
                "    {} {}",
                format!("<- {} tokens, ${:.4}", tokens.total, cost).dimmed(),
                preview(output)
            );
        }
        EventKind::StepEvaluated { passed, reason, .. } => {
            if *passed {
                println!("    {} {}", "pass".green(), reason);
            } else {
                println!("    {} {}", "fail".yellow(), reason);
            }
        }
        EventKind::StepError { step_id, error, .. } => {
            println!("    {} {}: {}", "error".red(), name_of(step_id), error);
        }
        EventKind::StepCompleted {
            step_name,
            passed,
            attempts,
            ..
        } => {
            let verdict = if *passed { "passed".green() } else { "failed".red() };
            println!("    {} {} after {} attempt(s)", step_name, verdict, attempts);
        }
        EventKind::RunCompleted {
            status,
            total_cost,
            total_tokens,
            error,
        } => {
            println!();
            let status_text = match status {
                RunStatus::Completed => status.to_string().green().bold(),
                _ => status.to_string().red().bold(),
            };
            println!(
                "Run {}: {} tokens, ${:.4}",
                status_text, total_tokens, total_cost
            );
            if let Some(message) = error {
                println!("{}", message.red());
            }
        }
    }
}

/// Prints the per-step table of a finished run.
fn print_summary(
    store: &InMemoryStore,
    run_id: &str,
    step_names: &HashMap<String, String>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("{}", "Step Summary:".bold());
    println!();

    for execution in store.list_step_executions(run_id)? {
        let name = step_names
            .get(&execution.step_id)
            .map(String::as_str)
            .unwrap_or(execution.step_id.as_str());
        let status = match execution.status {
            StepExecutionStatus::Passed => execution.status.to_string().green(),
            StepExecutionStatus::Failed => execution.status.to_string().red(),
            _ => execution.status.to_string().dimmed(),
        };
        println!(
            "  {:20} {:8} attempts: {}  tokens: {:>6}  cost: ${:.4}",
            name, status, execution.attempts, execution.tokens_used, execution.cost
        );
    }

    Ok(())
}

/// Main application entry point. Returns whether the run completed.
async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    // Load workflow
    info!("Loading workflow: {}", config.workflow_path);
    let workflow = load_workflow(&config.workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!(
            "Could not load workflow from '{}': {}",
            config.workflow_path, e
        )
    })?;
    validate_workflow(&workflow)?;

    info!("Workflow loaded: {} steps", workflow.steps.len());

    if config.dry_run {
        info!("Mode: DRY RUN (no provider calls)");
        println!();
        print_preview(&workflow);
        return Ok(true);
    }

    let provider_command = config
        .provider_command
        .ok_or("no completion provider configured")?;

    // Assemble store, provider and engine
    let store = Arc::new(open_store(config.state_file.as_deref())?);
    let workflow_id = store.save_workflow(workflow.clone())?;

    let mut provider = CommandProvider::new(provider_command);
    if let Some(ref path) = config.pricing_path {
        info!("Loading pricing: {}", path);
        provider = provider.with_pricing(PricingTable::load(path)?);
    }

    let mut engine = Engine::new(store.clone() as Arc<dyn Store>, Arc::new(provider));
    engine.set_retry_delay(config.retry_delay);
    engine.set_judge_model(config.judge_model);

    let step_names: HashMap<String, String> = workflow
        .steps
        .iter()
        .map(|step| (step.id.clone(), step.name.clone()))
        .collect();

    // Execute workflow
    let mut events = engine.subscribe();
    let mut timeline = ExecutionTimeline::new();
    let run_id = engine.execute(&workflow_id)?;
    info!("Run started: {}", run_id);
    println!();

    loop {
        match events.recv().await {
            Ok(event) if event.run_id == run_id => {
                timeline.record(&event);
                print_event(&event, &step_names);
                if matches!(event.kind, EventKind::RunCompleted { .. }) {
                    break;
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                warn!("Output fell behind, {} events skipped", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }

    print_summary(&store, &run_id, &step_names)?;
    println!("{}", timeline.gantt_chart());

    let run = store
        .get_run(&run_id)?
        .ok_or_else(|| format!("Run record missing: {}", run_id))?;

    Ok(run.status == RunStatus::Completed)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
