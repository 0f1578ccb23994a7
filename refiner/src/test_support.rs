//! Test-only doubles and a temp-project harness.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::io::config::RefinerConfig;
use crate::io::oracle::Oracle;
use crate::io::personas::{Persona, Personas};
use crate::io::prompt::Prompts;
use crate::io::shell::{ShellFailure, ShellOutput, ShellRequest, ShellRunner};
use crate::step::LoopContext;

/// One recorded oracle invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleCall {
    pub persona: String,
    pub prompt: String,
}

/// Oracle that replays scripted replies in order.
///
/// Each reply names the persona expected to ask for it; a mismatch or an
/// exhausted script is returned as an error, like a transport failure.
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<(String, String)>>,
    calls: RefCell<Vec<OracleCall>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<(&str, &str)>) -> Self {
        Self {
            replies: RefCell::new(
                replies
                    .into_iter()
                    .map(|(persona, reply)| (persona.to_string(), reply.to_string()))
                    .collect(),
            ),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls.borrow().clone()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Oracle for ScriptedOracle {
    fn invoke(&self, persona: &Persona, prompt: &str) -> Result<String> {
        self.calls.borrow_mut().push(OracleCall {
            persona: persona.name.clone(),
            prompt: prompt.to_string(),
        });
        let mut replies = self.replies.borrow_mut();
        let Some((expected, _)) = replies.front() else {
            return Err(anyhow!("scripted oracle exhausted (asked by {})", persona.name));
        };
        if *expected != persona.name {
            return Err(anyhow!(
                "scripted oracle expected persona {expected}, got {}",
                persona.name
            ));
        }
        let (_, reply) = replies
            .pop_front()
            .ok_or_else(|| anyhow!("scripted oracle exhausted"))?;
        Ok(reply)
    }
}

/// Shell runner that replays scripted outputs and records requests.
pub struct ScriptedShell {
    outputs: RefCell<VecDeque<ShellOutput>>,
    requests: RefCell<Vec<ShellRequest>>,
}

impl ScriptedShell {
    pub fn new(outputs: Vec<ShellOutput>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ShellRequest> {
        self.requests.borrow().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.command.clone())
            .collect()
    }
}

impl ShellRunner for ScriptedShell {
    fn run(&self, request: &ShellRequest) -> Result<ShellOutput> {
        self.requests.borrow_mut().push(request.clone());
        self.outputs
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted shell exhausted at {:?}", request.command))
    }
}

/// Successful shell output with the given stdout.
pub fn shell_ok(stdout: &str) -> ShellOutput {
    ShellOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
        failure: None,
    }
}

/// Failed shell output; exit code 127 is classified as command-not-found.
pub fn shell_fail(exit_code: i32, stdout: &str, stderr: &str) -> ShellOutput {
    let failure = if exit_code == 127 {
        ShellFailure::CommandNotFound
    } else {
        ShellFailure::NonZeroExit(exit_code)
    };
    ShellOutput {
        exit_code: Some(exit_code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        failure: Some(failure),
    }
}

/// Temp project root plus the config, personas and prompts a loop needs.
pub struct TestHarness {
    temp: TempDir,
    pub config: RefinerConfig,
    pub personas: Personas,
    pub prompts: Prompts,
}

impl TestHarness {
    pub fn new() -> Self {
        let config = RefinerConfig::default();
        Self {
            temp: tempfile::tempdir().expect("tempdir"),
            personas: Personas::from_config(&config.personas),
            prompts: Prompts::new(config.prompt_budget_bytes),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Write a project file, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, contents).expect("write project file");
    }

    pub fn context<'a>(
        &'a self,
        oracle: &'a dyn Oracle,
        shell: &'a dyn ShellRunner,
    ) -> LoopContext<'a> {
        LoopContext {
            root: self.root(),
            config: &self.config,
            oracle,
            shell,
            personas: &self.personas,
            prompts: &self.prompts,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
