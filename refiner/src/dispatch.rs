//! Tool dispatch: one exhaustive match over [`Plan`].

use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::normalize::{extract_json_object, strip_code_fences};
use crate::core::state::LoopState;
use crate::core::types::{ExecutionResult, Plan};
use crate::io::fs_tools::ProjectFs;
use crate::repair::{RepairConfig, RepairOutcome, RepairTools, run_with_repair};
use crate::step::LoopContext;

/// Execute an audited plan. Tool failures become failed results, never errors.
#[instrument(skip_all, fields(tool = plan.tool_name()))]
pub fn dispatch(ctx: &LoopContext<'_>, plan: &Plan, state: &LoopState) -> ExecutionResult {
    let fs = ProjectFs::new(ctx.root);
    let result = match plan {
        Plan::ReadFile {
            file_path,
            analysis_task,
            specialist,
        } => read_file(ctx, &fs, file_path, analysis_task, specialist),
        Plan::ModifyFile {
            file_path,
            modification_task,
        } => modify_file(ctx, &fs, file_path, modification_task, &state.original),
        Plan::CreateFile { file_path, content } => match fs.create_file(file_path, content) {
            Ok(()) => {
                ExecutionResult::refined(format!("created {file_path}"), state.original.clone())
            }
            Err(err) => ExecutionResult::failure(err.to_string()),
        },
        Plan::ExecuteShell { command } => execute_shell(ctx, command),
    };
    if result.succeeded {
        info!(summary = %result.summary, "tool succeeded");
    } else {
        warn!(summary = %result.summary, "tool failed");
    }
    result
}

fn read_file(
    ctx: &LoopContext<'_>,
    fs: &ProjectFs,
    file_path: &str,
    analysis_task: &str,
    specialist: &str,
) -> ExecutionResult {
    let Some(persona) = ctx.personas.specialist(specialist) else {
        return ExecutionResult::failure(format!(
            "unknown specialist '{specialist}' (available: {})",
            ctx.personas.specialist_names().join(", ")
        ));
    };
    let contents = match fs.read_file(file_path) {
        Ok(contents) => contents,
        Err(err) => return ExecutionResult::failure(err.to_string()),
    };
    let prompt = match ctx.prompts.specialist(analysis_task, file_path, &contents) {
        Ok(prompt) => prompt,
        Err(err) => return ExecutionResult::failure(format!("render specialist prompt: {err:#}")),
    };
    let raw = match ctx.oracle.invoke(persona, &prompt) {
        Ok(raw) => raw,
        Err(err) => {
            return ExecutionResult::failure(format!("specialist '{specialist}' failed: {err:#}"));
        }
    };

    let statement = extract_json_object(&raw).and_then(|object| {
        let refined = object.get("status").and_then(Value::as_str) == Some("REFINED");
        object
            .get("new_problem_statement")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|statement| refined && !statement.is_empty())
            .map(str::to_string)
    });
    match statement {
        Some(statement) => ExecutionResult::refined(
            format!("{specialist} analyzed {file_path} and proposed: {statement}"),
            statement,
        ),
        None => ExecutionResult::failure(format!(
            "specialist '{specialist}' did not return a REFINED problem statement: {}",
            raw.trim()
        )),
    }
}

fn modify_file(
    ctx: &LoopContext<'_>,
    fs: &ProjectFs,
    file_path: &str,
    modification_task: &str,
    original: &str,
) -> ExecutionResult {
    if let Err(err) = fs.require_existing(file_path) {
        return ExecutionResult::failure(err.to_string());
    }
    let contents = match fs.read_file(file_path) {
        Ok(contents) => contents,
        Err(err) => return ExecutionResult::failure(err.to_string()),
    };
    let prompt = match ctx.prompts.programmer(modification_task, file_path, &contents) {
        Ok(prompt) => prompt,
        Err(err) => return ExecutionResult::failure(format!("render programmer prompt: {err:#}")),
    };
    let raw = match ctx.oracle.invoke(&ctx.personas.programmer, &prompt) {
        Ok(raw) => raw,
        Err(err) => return ExecutionResult::failure(format!("programmer failed: {err:#}")),
    };
    let mut new_contents = strip_code_fences(&raw);
    if new_contents.is_empty() {
        return ExecutionResult::failure(format!(
            "programmer returned empty contents for {file_path}"
        ));
    }
    if contents.ends_with('\n') {
        new_contents.push('\n');
    }
    match fs.write_file(file_path, &new_contents) {
        Ok(()) => ExecutionResult::refined(format!("modified {file_path}"), original),
        Err(err) => ExecutionResult::failure(err.to_string()),
    }
}

fn execute_shell(ctx: &LoopContext<'_>, command: &str) -> ExecutionResult {
    let config = RepairConfig {
        workdir: ctx.root.to_path_buf(),
        timeout: Duration::from_secs(ctx.config.shell_timeout_secs),
        env: vec![(ctx.config.root_env_var.clone(), ctx.root.display().to_string())],
        output_limit_bytes: ctx.config.output_limit_bytes,
        max_attempts: ctx.config.max_shell_attempts,
    };
    let tools = RepairTools {
        shell: ctx.shell,
        oracle: ctx.oracle,
        engineer: &ctx.personas.engineer,
        prompts: ctx.prompts,
    };
    match run_with_repair(&tools, command, &config) {
        RepairOutcome::Succeeded {
            command, stdout, ..
        } => {
            let stdout = stdout.trim();
            if stdout.is_empty() {
                ExecutionResult::success(format!("command `{command}` succeeded with no output"))
            } else {
                ExecutionResult::success(stdout)
            }
        }
        RepairOutcome::AnalysisFindings {
            findings,
            refinement,
            ..
        } => ExecutionResult::refined(findings, refinement),
        RepairOutcome::Failed { summary, .. } => ExecutionResult::failure(summary),
    }
}
