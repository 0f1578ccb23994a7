//! `refiner`: autonomous plan, audit, execute and refine loop.
//!
//! Runs the refinement loop for a free-text problem against a project root,
//! printing each iteration and the reason the loop stopped.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};

use refiner::core::types::Report;
use refiner::exit_codes;
use refiner::io::config::{RefinerConfig, default_config_path, load_config, write_config};
use refiner::io::manifest::build_manifest;
use refiner::io::oracle::oracle_from_config;
use refiner::io::personas::Personas;
use refiner::io::prompt::Prompts;
use refiner::io::shell::SystemShell;
use refiner::logging;
use refiner::looping::{LoopOutcome, LoopStop, run_loop};
use refiner::step::{LoopContext, StepOutcome, StepTransition};

const CONFIRM_PROMPT: &str = "Confirm workspace is clean? (yes/no) ";
const PROBLEM_PROMPT: &str = "problem> ";

#[derive(Parser)]
#[command(
    name = "refiner",
    version,
    about = "Autonomous plan, audit, execute and refine loop"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct ProjectArgs {
    /// Project root the loop reads, writes and runs commands in.
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Config file (defaults to `<root>/.refiner/config.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ProjectArgs {
    fn config_path(&self, root: &Path) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| default_config_path(root))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the loop once for PROBLEM.
    Run {
        /// Free-text problem statement.
        problem: String,
        #[command(flatten)]
        project: ProjectArgs,
        /// Override `max_iterations` from config.
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Skip the workspace confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// Read problems line by line and run the loop for each; `exit` quits.
    Shell {
        #[command(flatten)]
        project: ProjectArgs,
        /// Skip the workspace confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the project manifest as JSON.
    Manifest {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Write the default config file.
    Init {
        #[command(flatten)]
        project: ProjectArgs,
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
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
        Command::Run {
            problem,
            project,
            max_iterations,
            yes,
        } => cmd_run(&problem, &project, max_iterations, yes),
        Command::Shell { project, yes } => cmd_shell(&project, yes),
        Command::Manifest { project } => cmd_manifest(&project),
        Command::Init { project, force } => cmd_init(&project, force),
    }
}

/// Canonical project root and its validated config.
fn load_project(project: &ProjectArgs) -> Result<(PathBuf, RefinerConfig)> {
    let root = project
        .root
        .canonicalize()
        .with_context(|| format!("resolve project root {}", project.root.display()))?;
    if !root.is_dir() {
        return Err(anyhow!("project root {} is not a directory", root.display()));
    }
    let config = load_config(&project.config_path(&root))?;
    Ok((root, config))
}

fn cmd_run(
    problem: &str,
    project: &ProjectArgs,
    max_iterations: Option<u32>,
    yes: bool,
) -> Result<i32> {
    if problem.trim().is_empty() {
        return Err(anyhow!("problem statement must not be empty"));
    }
    let (root, mut config) = load_project(project)?;
    if let Some(max_iterations) = max_iterations {
        config.max_iterations = max_iterations;
        config.validate()?;
    }

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    if !yes && !confirm(&mut input)? {
        println!("Aborted.");
        return Ok(exit_codes::ABORTED);
    }
    let outcome = run_problem(&root, &config, problem);
    Ok(exit_code_for(&outcome.stop))
}

fn cmd_shell(project: &ProjectArgs, yes: bool) -> Result<i32> {
    let (root, config) = load_project(project)?;
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    loop {
        let Some(line) = prompt_line(&mut input, PROBLEM_PROMPT)? else {
            return Ok(exit_codes::OK);
        };
        let problem = line.trim();
        if problem.is_empty() {
            continue;
        }
        if problem.eq_ignore_ascii_case("exit") {
            return Ok(exit_codes::OK);
        }
        if !yes && !confirm(&mut input)? {
            println!("Skipped.");
            continue;
        }
        run_problem(&root, &config, problem);
    }
}

fn cmd_manifest(project: &ProjectArgs) -> Result<i32> {
    let (root, config) = load_project(project)?;
    let manifest = build_manifest(&root, &config.manifest);
    println!("{}", manifest.to_json());
    Ok(exit_codes::OK)
}

fn cmd_init(project: &ProjectArgs, force: bool) -> Result<i32> {
    let root = project
        .root
        .canonicalize()
        .with_context(|| format!("resolve project root {}", project.root.display()))?;
    let path = project.config_path(&root);
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&path, &RefinerConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn run_problem(root: &Path, config: &RefinerConfig, problem: &str) -> LoopOutcome {
    let oracle = oracle_from_config(config, root);
    let personas = Personas::from_config(&config.personas);
    let prompts = Prompts::new(config.prompt_budget_bytes);
    let ctx = LoopContext {
        root,
        config,
        oracle: oracle.as_ref(),
        shell: &SystemShell,
        personas: &personas,
        prompts: &prompts,
    };
    println!("Problem: {}", problem.trim());
    let outcome = run_loop(&ctx, problem, print_step);
    print_stop(&outcome);
    outcome
}

fn print_step(step: &StepOutcome) {
    println!();
    println!("[iteration {}] {}", step.iteration, step.problem);
    if let Some(plan) = &step.plan {
        let target = plan.file_path().map_or_else(String::new, |path| format!(" {path}"));
        println!("  plan: {}{target}", plan.tool_name());
    }
    if let Some(audit) = &step.audit {
        match audit.rejection_reason() {
            None => println!("  audit: passed"),
            Some(reason) => println!("  audit: rejected ({reason})"),
        }
    }
    if let Some(execution) = &step.execution {
        let status = if execution.succeeded { "ok" } else { "failed" };
        println!("  execution: {status}: {}", first_line(&execution.summary));
    }
    if let Some(Report::Plain(text)) = &step.report {
        println!("  report: {text}");
    }
    match &step.transition {
        StepTransition::Refined { next } => println!("  next: {next}"),
        StepTransition::Unchanged { .. } => println!("  next: (unchanged)"),
        StepTransition::Stagnated { .. } => println!("  converged"),
        StepTransition::Halted { phase, reason } => {
            println!("  halted in {}: {reason}", phase.as_str());
        }
    }
}

fn print_stop(outcome: &LoopOutcome) {
    println!();
    match &outcome.stop {
        LoopStop::Stagnated { statement } => println!(
            "Converged after {} iteration(s): {statement}",
            outcome.iterations
        ),
        LoopStop::Failed { phase, reason } => println!(
            "Halted in {} after {} iteration(s): {reason}",
            phase.as_str(),
            outcome.iterations
        ),
        LoopStop::BudgetExhausted { iterations } => println!(
            "Iteration budget exhausted after {iterations} iteration(s); last focus: {}",
            outcome.state.current
        ),
    }
    println!("Transcripts: run {}", outcome.run_id);
}

fn exit_code_for(stop: &LoopStop) -> i32 {
    match stop {
        LoopStop::Stagnated { .. } => exit_codes::OK,
        LoopStop::Failed { .. } => exit_codes::HALTED_FAILURE,
        LoopStop::BudgetExhausted { .. } => exit_codes::BUDGET_EXHAUSTED,
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// Ask the operator to confirm; EOF counts as "no".
fn confirm<R: BufRead>(input: &mut R) -> Result<bool> {
    let answer = prompt_line(input, CONFIRM_PROMPT)?;
    Ok(answer.is_some_and(|answer| {
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }))
}

/// Print `prompt` and read one line; `None` on EOF.
fn prompt_line<R: BufRead>(input: &mut R, prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    std::io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    let read = input.read_line(&mut line).context("read stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}
