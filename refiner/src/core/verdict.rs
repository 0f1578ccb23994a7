//! Audit verdict parsing and the deterministic manifest pre-check.

use serde_json::Value;

use crate::core::manifest::{Manifest, normalize_path};
use crate::core::normalize::extract_json_object;
use crate::core::types::{AuditVerdict, Plan};

/// Parse auditor text into a verdict, failing closed.
///
/// Accepts `passed` or `audit_passed` as the boolean key. Unparseable output,
/// a missing boolean and a reason-less rejection all become rejections whose
/// reason describes the malformed response.
pub fn parse_verdict(raw: &str) -> AuditVerdict {
    let Some(object) = extract_json_object(raw) else {
        return AuditVerdict::rejected(format!(
            "malformed audit response: no JSON object in {:?}",
            preview(raw)
        ));
    };
    let passed = object
        .get("passed")
        .or_else(|| object.get("audit_passed"))
        .and_then(Value::as_bool);
    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .map(str::to_string);

    match (passed, reason) {
        (None, _) => AuditVerdict::rejected(
            "malformed audit response: missing boolean \"passed\" field".to_string(),
        ),
        (Some(true), reason) => AuditVerdict {
            passed: true,
            reason,
        },
        (Some(false), Some(reason)) => AuditVerdict::rejected(reason),
        (Some(false), None) => {
            AuditVerdict::rejected("malformed audit response: rejection without a reason")
        }
    }
}

/// Check a plan's file references against the manifest.
///
/// Returns the rejection reason, or `None` when the plan is consistent with
/// the manifest. The `placeholder` path and anything under it are exempt.
pub fn check_plan_against_manifest(
    plan: &Plan,
    manifest: &Manifest,
    placeholder: &str,
) -> Option<String> {
    let path = plan.file_path()?;
    if is_placeholder_path(path, placeholder) {
        return None;
    }
    match plan {
        Plan::CreateFile { file_path, .. } if manifest.contains(file_path) => {
            Some(format!("file already exists: {file_path}"))
        }
        Plan::ModifyFile { file_path, .. } if !manifest.contains(file_path) => Some(format!(
            "cannot create via modify: {file_path} does not exist"
        )),
        Plan::ReadFile { file_path, .. } if !manifest.contains(file_path) => {
            Some(format!("file not in manifest: {file_path}"))
        }
        _ => None,
    }
}

fn is_placeholder_path(path: &str, placeholder: &str) -> bool {
    let placeholder = normalize_path(placeholder);
    let placeholder = placeholder.trim_end_matches('/');
    if placeholder.is_empty() {
        return false;
    }
    let path = normalize_path(path);
    path == placeholder
        || path
            .strip_prefix(placeholder)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn preview(raw: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
