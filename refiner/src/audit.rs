//! Plan auditing: deterministic manifest check, then the auditor oracle.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::manifest::Manifest;
use crate::core::types::{AuditVerdict, Plan};
use crate::core::verdict::{check_plan_against_manifest, parse_verdict};
use crate::step::LoopContext;

/// Judge `plan` against `manifest`.
///
/// Plans that contradict the manifest are rejected without consulting the
/// oracle. `Err` means the auditor could not be reached; malformed auditor
/// output is a rejection, not an error.
#[instrument(skip_all, fields(tool = plan.tool_name()))]
pub fn audit_plan(ctx: &LoopContext<'_>, plan: &Plan, manifest: &Manifest) -> Result<AuditVerdict> {
    let placeholder = &ctx.config.manifest.dynamic_placeholder;
    if let Some(reason) = check_plan_against_manifest(plan, manifest, placeholder) {
        info!(%reason, "plan rejected by manifest check");
        return Ok(AuditVerdict::rejected(reason));
    }

    let plan_json = serde_json::to_string_pretty(plan).context("serialize plan for audit")?;
    let prompt = ctx
        .prompts
        .auditor(&plan_json, &manifest.to_json(), placeholder)
        .context("render auditor prompt")?;
    let raw = ctx
        .oracle
        .invoke(&ctx.personas.auditor, &prompt)
        .context("auditor oracle")?;
    let verdict = parse_verdict(&raw);
    debug!(passed = verdict.passed, "auditor verdict");
    Ok(verdict)
}
