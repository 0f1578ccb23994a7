//! Shared deterministic types for the refinement loop.
//!
//! These are iteration-scoped value objects: a [`Plan`] is produced by the
//! planner, judged by an [`AuditVerdict`], turned into an [`ExecutionResult`]
//! by the tool executors and summarized as a [`Report`]. None of them survive
//! past one iteration except through the problem statement they produce.

use serde::{Deserialize, Serialize};

/// A single structured action chosen by the planner.
///
/// The set of tools is closed: adding a tool means adding a variant here and
/// handling it in every exhaustive match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum Plan {
    /// Read a file and delegate its analysis to a named specialist.
    ReadFile {
        file_path: String,
        analysis_task: String,
        specialist: String,
    },
    /// Rewrite an existing file according to a modification task.
    ModifyFile {
        file_path: String,
        modification_task: String,
    },
    /// Create a new file with literal contents.
    CreateFile { file_path: String, content: String },
    /// Run a shell command in the project root.
    ExecuteShell { command: String },
}

impl Plan {
    /// Wire name of the tool this plan invokes.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Plan::ReadFile { .. } => "read_file",
            Plan::ModifyFile { .. } => "modify_file",
            Plan::CreateFile { .. } => "create_file",
            Plan::ExecuteShell { .. } => "execute_shell",
        }
    }

    /// Project-relative path the plan touches, if any.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            Plan::ReadFile { file_path, .. }
            | Plan::ModifyFile { file_path, .. }
            | Plan::CreateFile { file_path, .. } => Some(file_path),
            Plan::ExecuteShell { .. } => None,
        }
    }
}

/// Auditor judgement on a plan. A rejection always carries a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditVerdict {
    pub fn accepted() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
        }
    }

    /// Rejection reason, or a generic one for the (malformed) reason-less case.
    pub fn rejection_reason(&self) -> Option<&str> {
        if self.passed {
            return None;
        }
        Some(
            self.reason
                .as_deref()
                .unwrap_or("auditor rejected the plan without a reason"),
        )
    }
}

/// Outcome of dispatching a plan to its tool executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub succeeded: bool,
    /// Human-readable account of what happened.
    pub summary: String,
    /// Next problem statement proposed by the tool itself, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement: Option<String>,
}

impl ExecutionResult {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            summary: summary.into(),
            refinement: None,
        }
    }

    pub fn refined(summary: impl Into<String>, refinement: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            summary: summary.into(),
            refinement: Some(refinement.into()),
        }
    }

    pub fn failure(summary: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            summary: summary.into(),
            refinement: None,
        }
    }
}

/// Reporter output, classified once at the oracle boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Report {
    /// The next problem statement, verbatim.
    Refinement(String),
    /// A plain progress sentence; the problem statement stays as it is.
    Plain(String),
}

/// Loop phase in which an iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planning,
    Audit,
    Execution,
    Report,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Audit => "audit",
            Phase::Execution => "execution",
            Phase::Report => "report",
        }
    }
}
