//! One iteration of the refinement loop: plan, audit, execute, report.

use std::path::Path;

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::audit::audit_plan;
use crate::core::manifest::Manifest;
use crate::core::plan::parse_plan;
use crate::core::report::parse_report;
use crate::core::state::{LoopState, Transition};
use crate::core::types::{AuditVerdict, ExecutionResult, Phase, Plan, Report};
use crate::dispatch::dispatch;
use crate::io::config::{AuditRejectionPolicy, RefinerConfig};
use crate::io::manifest::build_manifest;
use crate::io::oracle::Oracle;
use crate::io::personas::Personas;
use crate::io::prompt::{PlannerPrompt, Prompts, ReporterPrompt};
use crate::io::shell::ShellRunner;
use crate::io::transcript::{IterationMeta, IterationRecord, write_iteration};

/// Everything an iteration needs, borrowed for the whole loop.
pub struct LoopContext<'a> {
    pub root: &'a Path,
    pub config: &'a RefinerConfig,
    pub oracle: &'a dyn Oracle,
    pub shell: &'a dyn ShellRunner,
    pub personas: &'a Personas,
    pub prompts: &'a Prompts,
}

/// How an iteration ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTransition {
    /// `current` moved to a new statement.
    Refined { next: String },
    /// Plain report; `current` unchanged.
    Unchanged { report: String },
    /// The refinement repeated `current`.
    Stagnated { statement: String },
    /// The iteration failed and the loop must stop.
    Halted { phase: Phase, reason: String },
}

impl StepTransition {
    fn outcome_label(&self) -> &'static str {
        match self {
            StepTransition::Refined { .. } => "refined",
            StepTransition::Unchanged { .. } => "unchanged",
            StepTransition::Stagnated { .. } => "stagnated",
            StepTransition::Halted { .. } => "failed",
        }
    }
}

/// Summary of one iteration, handed to the loop's observer.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub iteration: u32,
    /// Problem statement the iteration planned against.
    pub problem: String,
    pub manifest_len: usize,
    pub plan: Option<Plan>,
    pub audit: Option<AuditVerdict>,
    pub execution: Option<ExecutionResult>,
    pub report: Option<Report>,
    pub transition: StepTransition,
}

impl StepOutcome {
    fn new(iteration: u32, problem: &str, manifest: &Manifest) -> Self {
        Self {
            iteration,
            problem: problem.to_string(),
            manifest_len: manifest.len(),
            plan: None,
            audit: None,
            execution: None,
            report: None,
            transition: StepTransition::Halted {
                phase: Phase::Planning,
                reason: "iteration did not complete".to_string(),
            },
        }
    }

    fn halt(mut self, phase: Phase, reason: impl Into<String>) -> Self {
        self.transition = StepTransition::Halted {
            phase,
            reason: reason.into(),
        };
        self
    }

    /// Last phase that ran.
    pub fn phase(&self) -> Phase {
        match &self.transition {
            StepTransition::Halted { phase, .. } => *phase,
            _ if self.execution.is_none() => Phase::Audit,
            _ => Phase::Report,
        }
    }
}

/// Run one iteration against `state`, updating it in place.
///
/// Never fails: planner and auditor outages, malformed plans, rejections and
/// tool failures all end in [`StepTransition::Halted`].
#[instrument(skip_all, fields(iteration = state.iteration + 1))]
pub fn run_step(ctx: &LoopContext<'_>, state: &mut LoopState, run_id: &str) -> StepOutcome {
    let iteration = state.begin_iteration();
    let manifest = build_manifest(ctx.root, &ctx.config.manifest);
    info!(files = manifest.len(), current = %state.current, "starting iteration");

    let mut outcome = StepOutcome::new(iteration, &state.current, &manifest);
    outcome = execute_phases(ctx, state, &manifest, outcome);

    if ctx.config.transcripts {
        record_transcript(ctx.root, run_id, &outcome);
    }
    outcome
}

fn execute_phases(
    ctx: &LoopContext<'_>,
    state: &mut LoopState,
    manifest: &Manifest,
    mut outcome: StepOutcome,
) -> StepOutcome {
    let plan = match plan_next(ctx, state, manifest) {
        Ok(plan) => plan,
        Err(err) => return outcome.halt(Phase::Planning, format!("{err:#}")),
    };
    debug!(tool = plan.tool_name(), "planner chose action");
    outcome.plan = Some(plan.clone());

    let verdict = match audit_plan(ctx, &plan, manifest) {
        Ok(verdict) => verdict,
        Err(err) => return outcome.halt(Phase::Audit, format!("{err:#}")),
    };
    outcome.audit = Some(verdict.clone());
    if let Some(reason) = verdict.rejection_reason() {
        warn!(%reason, "audit rejected plan");
        return match ctx.config.audit_rejection {
            AuditRejectionPolicy::Halt => outcome.halt(Phase::Audit, reason),
            AuditRejectionPolicy::Refine => {
                let report = Report::Refinement(format!(
                    "Audit failed for task focus '{}' with reason: {reason}. Re-evaluate the original problem: {}",
                    state.current, state.original
                ));
                apply(state, outcome, report)
            }
        };
    }

    let execution = dispatch(ctx, &plan, state);
    outcome.execution = Some(execution.clone());
    if !execution.succeeded {
        return outcome.halt(Phase::Execution, execution.summary);
    }

    let report = report_outcome(ctx, state, &plan, &execution);
    apply(state, outcome, report)
}

fn plan_next(
    ctx: &LoopContext<'_>,
    state: &LoopState,
    manifest: &Manifest,
) -> anyhow::Result<Plan> {
    let prompt = ctx
        .prompts
        .planner(&PlannerPrompt {
            original: &state.original,
            current: &state.current,
            manifest_json: &manifest.to_json(),
            specialists: ctx.personas.specialist_names(),
            root_env_var: &ctx.config.root_env_var,
        })
        .context("render planner prompt")?;
    let raw = ctx
        .oracle
        .invoke(&ctx.personas.planner, &prompt)
        .context("planner oracle")?;
    parse_plan(&raw).context("invalid plan")
}

/// Ask the reporter; fall back to the tool's refinement or the original problem.
fn report_outcome(
    ctx: &LoopContext<'_>,
    state: &LoopState,
    plan: &Plan,
    execution: &ExecutionResult,
) -> Report {
    let fallback = || {
        Report::Refinement(
            execution
                .refinement
                .clone()
                .unwrap_or_else(|| state.original.clone()),
        )
    };
    let prompt = ctx.prompts.reporter(&ReporterPrompt {
        original: &state.original,
        current: &state.current,
        tool: plan.tool_name(),
        succeeded: execution.succeeded,
        summary: &execution.summary,
        refinement: execution.refinement.as_deref(),
    });
    let raw = match prompt.and_then(|prompt| ctx.oracle.invoke(&ctx.personas.reporter, &prompt)) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "reporter unavailable, using default refinement");
            return fallback();
        }
    };
    parse_report(&raw).unwrap_or_else(|| {
        warn!("reporter output unusable, using default refinement");
        fallback()
    })
}

fn apply(state: &mut LoopState, mut outcome: StepOutcome, report: Report) -> StepOutcome {
    outcome.transition = match state.apply_report(&report) {
        Transition::Refined => StepTransition::Refined {
            next: state.current.clone(),
        },
        Transition::Unchanged => StepTransition::Unchanged {
            report: match &report {
                Report::Plain(text) | Report::Refinement(text) => text.clone(),
            },
        },
        Transition::Stagnated => StepTransition::Stagnated {
            statement: state.current.clone(),
        },
    };
    info!(outcome = outcome.transition.outcome_label(), "iteration finished");
    outcome.report = Some(report);
    outcome
}

fn record_transcript(root: &Path, run_id: &str, outcome: &StepOutcome) {
    let reason = match &outcome.transition {
        StepTransition::Halted { reason, .. } => Some(reason.clone()),
        _ => None,
    };
    let record = IterationRecord {
        meta: IterationMeta {
            run_id: run_id.to_string(),
            iteration: outcome.iteration,
            problem: outcome.problem.clone(),
            phase: outcome.phase(),
            outcome: outcome.transition.outcome_label(),
            reason,
        },
        plan: outcome.plan.clone(),
        audit: outcome.audit.clone(),
        execution: outcome.execution.clone(),
        report: outcome.report.clone(),
    };
    if let Err(err) = write_iteration(root, &record) {
        warn!(err = %format!("{err:#}"), "failed to write iteration transcript");
    }
}
