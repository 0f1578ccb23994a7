//! Reasoning oracle abstraction.
//!
//! The [`Oracle`] trait decouples the loop from the model backend. Two
//! backends ship: `codex exec` and a generic stdin/stdout command. Tests use
//! scripted oracles that return predetermined replies per persona.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::{OracleBackend, RefinerConfig};
use crate::io::personas::Persona;
use crate::io::process::{CommandOutput, run_with_timeout};

/// Environment variable carrying the persona name to stdio oracles.
pub const PERSONA_ENV_VAR: &str = "REFINER_PERSONA";

/// Abstraction over reasoning backends.
pub trait Oracle {
    /// Answer `prompt` in the role of `persona`. `Err` is a transport failure.
    fn invoke(&self, persona: &Persona, prompt: &str) -> Result<String>;
}

/// Prompt text sent to backends: persona instructions, then the task prompt.
pub fn compose_prompt(persona: &Persona, prompt: &str) -> String {
    format!("{}\n\n{}", persona.instructions.trim(), prompt.trim())
}

/// Settings shared by the process-backed oracles.
#[derive(Debug, Clone)]
pub struct OracleProcess {
    /// Program and leading arguments.
    pub command: Vec<String>,
    /// Working directory; the project root.
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl OracleProcess {
    fn base_command(&self) -> Result<Command> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("oracle command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        Ok(cmd)
    }

    fn check(&self, label: &str, output: &CommandOutput) -> Result<()> {
        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "{label} timed out");
            return Err(anyhow!("{label} timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "{label} failed");
            return Err(anyhow!(
                "{label} failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }
        Ok(())
    }
}

/// Oracle that spawns `codex exec` in a read-only sandbox.
pub struct CodexOracle {
    process: OracleProcess,
}

impl CodexOracle {
    pub fn new(process: OracleProcess) -> Self {
        Self { process }
    }
}

impl Oracle for CodexOracle {
    #[instrument(skip_all, fields(persona = %persona.name, prompt_bytes = prompt.len()))]
    fn invoke(&self, persona: &Persona, prompt: &str) -> Result<String> {
        info!(workdir = %self.process.workdir.display(), "starting codex exec");
        let output_file = tempfile::Builder::new()
            .prefix("refiner-answer-")
            .suffix(".txt")
            .tempfile()
            .context("create codex output file")?;
        let schema_file = match persona.output_schema {
            Some(schema) => {
                let file = tempfile::Builder::new()
                    .prefix("refiner-schema-")
                    .suffix(".json")
                    .tempfile()
                    .context("create codex schema file")?;
                fs::write(file.path(), schema)
                    .with_context(|| format!("write schema {}", file.path().display()))?;
                Some(file)
            }
            None => None,
        };

        let mut cmd = self.process.base_command()?;
        cmd.arg("exec")
            .arg("--sandbox")
            .arg("read-only")
            // Projects need not be git repositories.
            .arg("--skip-git-repo-check");
        if let Some(schema) = &schema_file {
            cmd.arg("--output-schema").arg(schema.path());
        }
        cmd.arg("--output-last-message")
            .arg(output_file.path())
            .arg("-");

        let composed = compose_prompt(persona, prompt);
        let output = run_with_timeout(
            cmd,
            Some(composed.as_bytes()),
            self.process.timeout,
            self.process.output_limit_bytes,
        )
        .context("run codex exec")?;
        self.process.check("codex exec", &output)?;

        let answer = read_answer(output_file.path())?;
        debug!(answer_bytes = answer.len(), "codex exec completed");
        Ok(answer)
    }
}

fn read_answer(path: &Path) -> Result<String> {
    let answer = fs::read_to_string(path)
        .with_context(|| format!("read codex output {}", path.display()))?;
    if answer.trim().is_empty() {
        return Err(anyhow!("codex exec produced no final message"));
    }
    Ok(answer)
}

/// Oracle that pipes the prompt to an arbitrary command and reads stdout.
///
/// The persona name is exported as [`PERSONA_ENV_VAR`].
pub struct StdioOracle {
    process: OracleProcess,
}

impl StdioOracle {
    pub fn new(process: OracleProcess) -> Self {
        Self { process }
    }
}

impl Oracle for StdioOracle {
    #[instrument(skip_all, fields(persona = %persona.name, prompt_bytes = prompt.len()))]
    fn invoke(&self, persona: &Persona, prompt: &str) -> Result<String> {
        let mut cmd = self.process.base_command()?;
        cmd.env(PERSONA_ENV_VAR, &persona.name);
        let composed = compose_prompt(persona, prompt);
        let output = run_with_timeout(
            cmd,
            Some(composed.as_bytes()),
            self.process.timeout,
            self.process.output_limit_bytes,
        )
        .context("run oracle command")?;
        self.process.check("oracle command", &output)?;
        let answer = output.stdout_text();
        debug!(answer_bytes = answer.len(), "oracle command completed");
        Ok(answer)
    }
}

/// Build the configured oracle backend for a project root.
pub fn oracle_from_config(config: &RefinerConfig, root: &Path) -> Box<dyn Oracle> {
    let process = OracleProcess {
        command: config.oracle.command.clone(),
        workdir: root.to_path_buf(),
        env: vec![(config.root_env_var.clone(), root.display().to_string())],
        timeout: Duration::from_secs(config.oracle.timeout_secs),
        output_limit_bytes: config.output_limit_bytes,
    };
    match config.oracle.backend {
        OracleBackend::Codex => Box::new(CodexOracle::new(process)),
        OracleBackend::Stdio => Box::new(StdioOracle::new(process)),
    }
}
