//! Classification of engineer responses during shell self-repair.

use serde_json::Value;

use crate::core::normalize::{extract_json_object, strip_code_fences};

/// Literal reply meaning the failing command is a working analysis tool.
pub const SUCCESS_SENTINEL: &str = "SUCCESS";

const PACKAGE_MANAGERS: &[&str] = &[
    "apk", "apt", "apt-get", "brew", "cargo", "conda", "dnf", "gem", "go", "npm", "pip", "pip3",
    "pnpm", "poetry", "uv", "yarn", "yum",
];

/// What the engineer proposed for a failing command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixProposal {
    /// The non-zero exit is a valid report (linters, test runners).
    AnalysisSucceeded,
    /// Install a dependency, then retry the current command.
    Install(String),
    /// Replace the current command.
    Rewrite(String),
    /// Nothing usable; carries the reason.
    Invalid(String),
}

/// Interpret an engineer response after fence stripping.
pub fn classify_fix(raw: &str) -> FixProposal {
    let text = strip_code_fences(raw);
    if text.is_empty() {
        return FixProposal::Invalid("no valid fix provided: empty response".to_string());
    }
    if text == SUCCESS_SENTINEL {
        return FixProposal::AnalysisSucceeded;
    }
    let command = if text.starts_with('{') {
        let command = extract_json_object(&text)
            .and_then(|object| {
                object
                    .get("command")
                    .and_then(Value::as_str)
                    .map(|command| command.trim().to_string())
            })
            .filter(|command| !command.is_empty());
        match command {
            Some(command) => command,
            None => {
                return FixProposal::Invalid(
                    "no valid fix provided: JSON response without a command".to_string(),
                );
            }
        }
    } else {
        text
    };
    if is_install_command(&command) {
        FixProposal::Install(command)
    } else {
        FixProposal::Rewrite(command)
    }
}

/// Whether a command installs a dependency rather than replacing the task.
pub fn is_install_command(command: &str) -> bool {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    tokens.iter().enumerate().any(|(idx, token)| {
        *token == "install"
            || (*token == "add"
                && idx > 0
                && tokens[idx - 1]
                    .rsplit('/')
                    .next()
                    .is_some_and(|name| PACKAGE_MANAGERS.contains(&name)))
    })
}
