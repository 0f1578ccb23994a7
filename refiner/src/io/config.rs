//! Refiner configuration stored under `.refiner/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Directory under the project root holding config and transcripts.
pub const STATE_DIR: &str = ".refiner";

/// Default config location for a project root.
pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join("config.toml")
}

/// Refiner configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefinerConfig {
    /// Iterations before the loop gives up without a verdict.
    pub max_iterations: u32,

    /// Wall-clock limit per shell command, in seconds.
    pub shell_timeout_secs: u64,

    /// Runs of the planned command (including rewrites) before self-repair gives up.
    pub max_shell_attempts: u32,

    /// Keep at most this many bytes of each subprocess output stream.
    pub output_limit_bytes: usize,

    /// Trim droppable prompt sections to keep rendered prompts under this size.
    pub prompt_budget_bytes: usize,

    /// Environment variable exported to subprocesses with the project root path.
    pub root_env_var: String,

    /// What an audit rejection does to the loop.
    pub audit_rejection: AuditRejectionPolicy,

    /// Write per-iteration transcripts under `.refiner/runs/`.
    pub transcripts: bool,

    pub manifest: ManifestConfig,
    pub oracle: OracleConfig,
    pub personas: PersonasConfig,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            shell_timeout_secs: 60,
            max_shell_attempts: 3,
            output_limit_bytes: 100_000,
            prompt_budget_bytes: 60_000,
            root_env_var: "REFINER_ROOT".to_string(),
            audit_rejection: AuditRejectionPolicy::Halt,
            transcripts: true,
            manifest: ManifestConfig::default(),
            oracle: OracleConfig::default(),
            personas: PersonasConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditRejectionPolicy {
    /// Stop the loop and surface the reason.
    #[default]
    Halt,
    /// Turn the reason into the next problem statement.
    Refine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManifestConfig {
    /// Directory names pruned anywhere in the tree.
    pub ignore_dirs: Vec<String>,
    /// File names dropped anywhere in the tree.
    pub ignore_files: Vec<String>,
    /// Path prefix the auditor accepts for files produced at runtime.
    pub dynamic_placeholder: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: [
                ".git",
                ".hg",
                ".idea",
                ".mypy_cache",
                ".pytest_cache",
                ".refiner",
                ".svn",
                ".tox",
                ".venv",
                ".vscode",
                "__pycache__",
                "build",
                "dist",
                "node_modules",
                "target",
                "venv",
            ]
            .map(String::from)
            .to_vec(),
            ignore_files: [".DS_Store", ".gitignore"].map(String::from).to_vec(),
            dynamic_placeholder: "DYNAMIC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleBackend {
    /// `codex exec` with a read-only sandbox.
    #[default]
    Codex,
    /// Any command reading the prompt on stdin and answering on stdout.
    Stdio,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    pub backend: OracleBackend,
    /// Program and leading arguments. For `codex` this is the binary plus
    /// extra `exec` arguments (e.g. `["codex", "-m", "o4-mini"]`).
    pub command: Vec<String>,
    /// Wall-clock limit per oracle call, in seconds.
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::Codex,
            command: vec!["codex".to_string()],
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PersonasConfig {
    /// Specialist name to instructions. Planners may only name these.
    pub specialists: BTreeMap<String, String>,
}

impl Default for PersonasConfig {
    fn default() -> Self {
        Self {
            specialists: crate::io::personas::default_specialists(),
        }
    }
}

impl RefinerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.shell_timeout_secs == 0 {
            return Err(anyhow!("shell_timeout_secs must be > 0"));
        }
        if self.max_shell_attempts == 0 {
            return Err(anyhow!("max_shell_attempts must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.root_env_var.trim().is_empty() {
            return Err(anyhow!("root_env_var must be non-empty"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.command.is_empty() || self.oracle.command[0].trim().is_empty() {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        if let Some(name) = self
            .personas
            .specialists
            .keys()
            .find(|name| name.trim().is_empty())
        {
            return Err(anyhow!("personas.specialists has an empty name {name:?}"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RefinerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RefinerConfig> {
    if !path.exists() {
        let cfg = RefinerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RefinerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RefinerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
