//! Shell self-repair: run a command, and on failure ask the engineer persona
//! for a fix, within a bounded number of attempts.
//!
//! Each attempt runs the current command. A failing attempt (other than the
//! last) consults the engineer, whose reply is one of:
//!
//! - `SUCCESS`: the command is an analysis tool reporting findings; stop and
//!   turn its output into a refinement.
//! - an install command: run it once, then retry the current command. A failing
//!   install ends the subroutine.
//! - any other command: it replaces the current command for later attempts.
//! - nothing usable: fail immediately.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::fix::{FixProposal, classify_fix};
use crate::io::oracle::Oracle;
use crate::io::personas::Persona;
use crate::io::prompt::{EngineerPrompt, Prompts};
use crate::io::shell::{ShellOutput, ShellRequest, ShellRunner};

/// Limits and environment for one self-repair run.
#[derive(Debug, Clone)]
pub struct RepairConfig {
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
    pub output_limit_bytes: usize,
    /// Runs of the planned command (original or rewritten) allowed.
    pub max_attempts: u32,
}

/// Collaborators the subroutine consults.
pub struct RepairTools<'a> {
    pub shell: &'a dyn ShellRunner,
    pub oracle: &'a dyn Oracle,
    pub engineer: &'a Persona,
    pub prompts: &'a Prompts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The command exited 0.
    Succeeded {
        command: String,
        stdout: String,
        attempts: u32,
    },
    /// The engineer judged the failure to be a valid analysis report.
    AnalysisFindings {
        command: String,
        findings: String,
        refinement: String,
        attempts: u32,
    },
    Failed { summary: String, attempts: u32 },
}

/// Prefix of the refinement produced from analysis findings.
pub const FINDINGS_REFINEMENT_PREFIX: &str =
    "The analysis tool ran successfully and found issues. Review this report and create a plan to fix them: ";

/// Run `command` with self-repair. Never returns an error: every failure is
/// folded into [`RepairOutcome::Failed`] with a summary.
#[instrument(skip_all, fields(command = %command, max_attempts = config.max_attempts))]
pub fn run_with_repair(
    tools: &RepairTools<'_>,
    command: &str,
    config: &RepairConfig,
) -> RepairOutcome {
    let mut command = command.trim().to_string();
    let mut previous_fix: Option<String> = None;

    for attempt in 1..=config.max_attempts {
        info!(attempt, %command, "running command");
        let output = match run(tools.shell, &command, config) {
            Ok(output) => output,
            Err(summary) => return RepairOutcome::Failed { summary, attempts: attempt },
        };
        if output.succeeded() {
            return RepairOutcome::Succeeded {
                command,
                stdout: output.stdout,
                attempts: attempt,
            };
        }
        warn!(attempt, failure = ?output.failure, "command failed");
        if attempt == config.max_attempts {
            return RepairOutcome::Failed {
                summary: format!(
                    "command `{command}` failed after {attempt} attempt(s): {}",
                    output.describe()
                ),
                attempts: attempt,
            };
        }

        let reply = match ask_engineer(tools, &command, &output, previous_fix.as_deref()) {
            Ok(reply) => reply,
            Err(summary) => return RepairOutcome::Failed { summary, attempts: attempt },
        };
        match classify_fix(&reply) {
            FixProposal::AnalysisSucceeded => {
                let findings = if output.stdout.trim().is_empty() {
                    output.stderr.trim().to_string()
                } else {
                    output.stdout.trim().to_string()
                };
                info!(attempt, "engineer reports the command produced analysis findings");
                return RepairOutcome::AnalysisFindings {
                    refinement: format!("{FINDINGS_REFINEMENT_PREFIX}{findings}"),
                    command,
                    findings,
                    attempts: attempt,
                };
            }
            FixProposal::Invalid(reason) => {
                warn!(%reason, "engineer gave no usable fix");
                return RepairOutcome::Failed {
                    summary: format!("command `{command}` failed and {reason}"),
                    attempts: attempt,
                };
            }
            FixProposal::Install(fix) => {
                info!(%fix, "running install fix");
                let fix_output = match run(tools.shell, &fix, config) {
                    Ok(fix_output) => fix_output,
                    Err(summary) => return RepairOutcome::Failed { summary, attempts: attempt },
                };
                if !fix_output.succeeded() {
                    return RepairOutcome::Failed {
                        summary: format!("install fix `{fix}` failed: {}", fix_output.describe()),
                        attempts: attempt,
                    };
                }
                previous_fix = Some(fix);
            }
            FixProposal::Rewrite(fix) => {
                debug!(from = %command, to = %fix, "engineer rewrote the command");
                command = fix.clone();
                previous_fix = Some(fix);
            }
        }
    }

    RepairOutcome::Failed {
        summary: format!("command `{command}` was never run"),
        attempts: 0,
    }
}

fn run(
    shell: &dyn ShellRunner,
    command: &str,
    config: &RepairConfig,
) -> Result<ShellOutput, String> {
    let request = ShellRequest {
        command: command.to_string(),
        workdir: config.workdir.clone(),
        timeout: config.timeout,
        env: config.env.clone(),
        output_limit_bytes: config.output_limit_bytes,
    };
    shell
        .run(&request)
        .map_err(|err| format!("could not run `{command}`: {err:#}"))
}

fn ask_engineer(
    tools: &RepairTools<'_>,
    command: &str,
    output: &ShellOutput,
    previous_fix: Option<&str>,
) -> Result<String, String> {
    let prompt = tools
        .prompts
        .engineer(&EngineerPrompt {
            command,
            stdout: &output.stdout,
            stderr: &output.stderr,
            previous_fix,
        })
        .map_err(|err| format!("render engineer prompt: {err:#}"))?;
    tools
        .oracle
        .invoke(tools.engineer, &prompt)
        .map_err(|err| {
            format!("command `{command}` failed and the engineer was unavailable: {err:#}")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::personas::Personas;
    use crate::io::shell::ShellFailure;
    use crate::test_support::{ScriptedOracle, ScriptedShell, shell_fail, shell_ok};

    struct Fixture {
        personas: Personas,
        prompts: Prompts,
        config: RepairConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                personas: Personas::default(),
                prompts: Prompts::new(60_000),
                config: RepairConfig {
                    workdir: PathBuf::from("."),
                    timeout: Duration::from_secs(60),
                    env: Vec::new(),
                    output_limit_bytes: 10_000,
                    max_attempts: 3,
                },
            }
        }

        fn run(
            &self,
            shell: &ScriptedShell,
            oracle: &ScriptedOracle,
            command: &str,
        ) -> RepairOutcome {
            let tools = RepairTools {
                shell,
                oracle,
                engineer: &self.personas.engineer,
                prompts: &self.prompts,
            };
            run_with_repair(&tools, command, &self.config)
        }
    }

    #[test]
    fn echo_succeeds_without_consulting_engineer() {
        let fixture = Fixture::new();
        let shell = ScriptedShell::new(vec![shell_ok("hi\n")]);
        let oracle = ScriptedOracle::new(Vec::new());

        let outcome = fixture.run(&shell, &oracle, "echo hi");
        assert_eq!(
            outcome,
            RepairOutcome::Succeeded {
                command: "echo hi".to_string(),
                stdout: "hi\n".to_string(),
                attempts: 1
            }
        );
        assert_eq!(shell.commands(), ["echo hi"]);
        assert!(oracle.calls().is_empty());
    }

    #[test]
    fn two_rewrites_then_success_runs_three_commands() {
        let fixture = Fixture::new();
        let shell = ScriptedShell::new(vec![
            shell_fail(127, "", "mypy: not found"),
            shell_fail(1, "", "No module named mypy"),
            shell_ok("Success: no issues found\n"),
        ]);
        let oracle = ScriptedOracle::new(vec![
            ("engineer", "```bash\npython3 -m mypy .\n```"),
            ("engineer", "python3 -m mypy --ignore-missing-imports ."),
        ]);

        let outcome = fixture.run(&shell, &oracle, "mypy .");
        assert!(matches!(outcome, RepairOutcome::Succeeded { attempts: 3, .. }));
        assert_eq!(
            shell.commands(),
            [
                "mypy .",
                "python3 -m mypy .",
                "python3 -m mypy --ignore-missing-imports ."
            ]
        );
        let calls = oracle.calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].prompt.contains("### Previous Attempt"));
        assert!(calls[1].prompt.contains("### Previous Attempt"));
        assert!(calls[1].prompt.contains("python3 -m mypy ."));
    }

    #[test]
    fn install_fix_retries_current_command() {
        let fixture = Fixture::new();
        let shell = ScriptedShell::new(vec![
            shell_fail(1, "", "ModuleNotFoundError: requests"),
            shell_ok("installed\n"),
            shell_ok("done\n"),
        ]);
        let oracle = ScriptedOracle::new(vec![("engineer", "pip install requests")]);

        let outcome = fixture.run(&shell, &oracle, "python3 app.py");
        assert!(matches!(outcome, RepairOutcome::Succeeded { attempts: 2, .. }));
        assert_eq!(
            shell.commands(),
            ["python3 app.py", "pip install requests", "python3 app.py"]
        );
    }

    #[test]
    fn failing_install_stops_without_retry() {
        let fixture = Fixture::new();
        let shell = ScriptedShell::new(vec![
            shell_fail(1, "", "missing dep"),
            shell_fail(1, "", "no network"),
        ]);
        let oracle = ScriptedOracle::new(vec![("engineer", "pip install dep")]);

        let RepairOutcome::Failed { summary, attempts } = fixture.run(&shell, &oracle, "python3 app.py")
        else {
            panic!("expected failure");
        };
        assert_eq!(attempts, 1);
        assert!(summary.contains("install fix `pip install dep` failed"));
        assert_eq!(shell.commands(), ["python3 app.py", "pip install dep"]);
    }

    #[test]
    fn success_sentinel_turns_output_into_refinement() {
        let fixture = Fixture::new();
        let shell = ScriptedShell::new(vec![shell_fail(1, "src/a.py:3: unused import\n", "")]);
        let oracle = ScriptedOracle::new(vec![("engineer", "SUCCESS")]);

        let RepairOutcome::AnalysisFindings { refinement, findings, .. } =
            fixture.run(&shell, &oracle, "ruff check .")
        else {
            panic!("expected findings");
        };
        assert_eq!(findings, "src/a.py:3: unused import");
        assert_eq!(
            refinement,
            format!("{FINDINGS_REFINEMENT_PREFIX}src/a.py:3: unused import")
        );
    }

    #[test]
    fn invalid_fix_fails_immediately() {
        let fixture = Fixture::new();
        let shell = ScriptedShell::new(vec![shell_fail(2, "", "bad flag")]);
        let oracle = ScriptedOracle::new(vec![("engineer", r#"{"analysis": "unclear"}"#)]);

        let RepairOutcome::Failed { summary, attempts } = fixture.run(&shell, &oracle, "tool --bad")
        else {
            panic!("expected failure");
        };
        assert_eq!(attempts, 1);
        assert!(summary.contains("no valid fix provided"));
        assert_eq!(shell.commands().len(), 1);
    }

    #[test]
    fn last_attempt_failure_is_final() {
        let fixture = Fixture::new();
        let shell = ScriptedShell::new(vec![
            shell_fail(1, "", "e1"),
            shell_fail(1, "", "e2"),
            shell_fail(1, "out3", "e3"),
        ]);
        let oracle = ScriptedOracle::new(vec![("engineer", "cmd2"), ("engineer", "cmd3")]);

        let RepairOutcome::Failed { summary, attempts } = fixture.run(&shell, &oracle, "cmd1") else {
            panic!("expected failure");
        };
        assert_eq!(attempts, 3);
        assert!(summary.contains("cmd3"));
        assert!(summary.contains("out3"));
        assert!(summary.contains("e3"));
        assert_eq!(oracle.calls().len(), 2);
    }

    #[test]
    fn timeout_is_reported_in_summary() {
        let mut fixture = Fixture::new();
        fixture.config.max_attempts = 1;
        let shell = ScriptedShell::new(vec![ShellOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            failure: Some(ShellFailure::TimedOut(Duration::from_secs(60))),
        }]);
        let oracle = ScriptedOracle::new(Vec::new());

        let RepairOutcome::Failed { summary, .. } = fixture.run(&shell, &oracle, "sleep 100") else {
            panic!("expected failure");
        };
        assert!(summary.contains("timed out after 60s"));
    }

    #[test]
    fn engineer_outage_fails_the_command() {
        let fixture = Fixture::new();
        let shell = ScriptedShell::new(vec![shell_fail(1, "", "boom")]);
        let oracle = ScriptedOracle::new(Vec::new());

        let RepairOutcome::Failed { summary, .. } = fixture.run(&shell, &oracle, "make") else {
            panic!("expected failure");
        };
        assert!(summary.contains("engineer was unavailable"));
    }
}
