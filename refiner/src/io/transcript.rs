//! Per-iteration transcripts under `.refiner/runs/<run-id>/<iter>/`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::report::REFINEMENT_MARKER;
use crate::core::types::{AuditVerdict, ExecutionResult, Phase, Plan, Report};
use crate::io::config::STATE_DIR;

/// Identifier for one loop invocation: `run-<unix-seconds>-<pid>`.
pub fn new_run_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    format!("run-{secs}-{}", std::process::id())
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationMeta {
    pub run_id: String,
    pub iteration: u32,
    /// Problem statement the iteration planned against.
    pub problem: String,
    /// Last phase the iteration reached.
    pub phase: Phase,
    /// `refined`, `unchanged`, `stagnated` or `failed`.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TranscriptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub plan_path: PathBuf,
    pub audit_path: PathBuf,
    pub execution_path: PathBuf,
    pub report_path: PathBuf,
}

impl TranscriptPaths {
    pub fn new(root: &Path, run_id: &str, iteration: u32) -> Self {
        let dir = root
            .join(STATE_DIR)
            .join("runs")
            .join(run_id)
            .join(iteration.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            plan_path: dir.join("plan.json"),
            audit_path: dir.join("audit.json"),
            execution_path: dir.join("execution.json"),
            report_path: dir.join("report.txt"),
            dir,
        }
    }
}

/// Everything one iteration produced. Phases that did not run are `None`.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub meta: IterationMeta,
    pub plan: Option<Plan>,
    pub audit: Option<AuditVerdict>,
    pub execution: Option<ExecutionResult>,
    pub report: Option<Report>,
}

pub fn write_iteration(root: &Path, record: &IterationRecord) -> Result<TranscriptPaths> {
    let paths = TranscriptPaths::new(root, &record.meta.run_id, record.meta.iteration);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create transcript dir {}", paths.dir.display()))?;

    // Deterministic order keeps transcripts diffable.
    write_json(&paths.meta_path, &record.meta)?;
    if let Some(plan) = &record.plan {
        write_json(&paths.plan_path, plan)?;
    }
    if let Some(audit) = &record.audit {
        write_json(&paths.audit_path, audit)?;
    }
    if let Some(execution) = &record.execution {
        write_json(&paths.execution_path, execution)?;
    }
    if let Some(report) = &record.report {
        write_text(&paths.report_path, &render_report(report))?;
    }
    Ok(paths)
}

fn render_report(report: &Report) -> String {
    match report {
        Report::Refinement(text) => format!("{REFINEMENT_MARKER} {text}\n"),
        Report::Plain(text) => format!("{text}\n"),
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(outcome: &'static str) -> IterationMeta {
        IterationMeta {
            run_id: "run-1".to_string(),
            iteration: 2,
            problem: "fix the build".to_string(),
            phase: Phase::Report,
            outcome,
            reason: None,
        }
    }

    #[test]
    fn transcript_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = TranscriptPaths::new(temp.path(), "run-1", 3);
        assert!(paths.dir.ends_with(Path::new(".refiner/runs/run-1/3")));
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.report_path.ends_with("report.txt"));
    }

    #[test]
    fn writes_only_phases_that_ran() {
        let temp = tempfile::tempdir().expect("tempdir");
        let record = IterationRecord {
            meta: IterationMeta {
                phase: Phase::Audit,
                outcome: "failed",
                reason: Some("file already exists: README.md".to_string()),
                ..meta("failed")
            },
            plan: Some(Plan::CreateFile {
                file_path: "README.md".to_string(),
                content: "hi".to_string(),
            }),
            audit: Some(AuditVerdict::rejected("file already exists: README.md")),
            execution: None,
            report: None,
        };
        let paths = write_iteration(temp.path(), &record).expect("write");

        let meta: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.meta_path).expect("read"))
                .expect("json");
        assert_eq!(meta["phase"], "audit");
        assert_eq!(meta["reason"], "file already exists: README.md");
        assert!(paths.plan_path.exists());
        assert!(paths.audit_path.exists());
        assert!(!paths.execution_path.exists());
        assert!(!paths.report_path.exists());
    }

    #[test]
    fn report_keeps_marker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let record = IterationRecord {
            meta: meta("refined"),
            plan: None,
            audit: None,
            execution: Some(ExecutionResult::success("ok")),
            report: Some(Report::Refinement("next".to_string())),
        };
        let paths = write_iteration(temp.path(), &record).expect("write");
        assert_eq!(
            fs::read_to_string(paths.report_path).expect("read"),
            "REFINEMENT: next\n"
        );
    }

    #[test]
    fn run_ids_have_expected_shape() {
        let id = new_run_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "run");
        assert!(parts[1].parse::<u64>().is_ok());
        assert_eq!(parts[2], std::process::id().to_string());
    }
}
