//! Prompt rendering for every oracle persona.
//!
//! Templates live in `prompts/*.md` and mark their sections with
//! `<!-- section:KEY required|trimmable -->`. When a rendered prompt exceeds
//! the byte budget, trimmable sections are truncated (largest first) until
//! it fits; required sections are never touched.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const AUDITOR_TEMPLATE: &str = include_str!("prompts/auditor.md");
const SPECIALIST_TEMPLATE: &str = include_str!("prompts/specialist.md");
const PROGRAMMER_TEMPLATE: &str = include_str!("prompts/programmer.md");
const ENGINEER_TEMPLATE: &str = include_str!("prompts/engineer.md");
const REPORTER_TEMPLATE: &str = include_str!("prompts/reporter.md");

/// Bytes a trimmed section keeps before the truncation notice.
const MIN_SECTION_BYTES: usize = 256;

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|trimmable)\s*-->").expect("section marker regex")
});

/// Inputs of the planner prompt.
#[derive(Debug, Clone)]
pub struct PlannerPrompt<'a> {
    pub original: &'a str,
    pub current: &'a str,
    pub manifest_json: &'a str,
    pub specialists: Vec<&'a str>,
    pub root_env_var: &'a str,
}

/// Inputs of the engineer prompt.
#[derive(Debug, Clone)]
pub struct EngineerPrompt<'a> {
    pub command: &'a str,
    pub stdout: &'a str,
    pub stderr: &'a str,
    /// Fix applied on the previous attempt, if any.
    pub previous_fix: Option<&'a str>,
}

/// Inputs of the reporter prompt.
#[derive(Debug, Clone)]
pub struct ReporterPrompt<'a> {
    pub original: &'a str,
    pub current: &'a str,
    pub tool: &'a str,
    pub succeeded: bool,
    pub summary: &'a str,
    pub refinement: Option<&'a str>,
}

/// Template engine plus byte budget, built once per loop.
pub struct Prompts {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl Prompts {
    pub fn new(budget_bytes: usize) -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("planner", PLANNER_TEMPLATE),
            ("auditor", AUDITOR_TEMPLATE),
            ("specialist", SPECIALIST_TEMPLATE),
            ("programmer", PROGRAMMER_TEMPLATE),
            ("engineer", ENGINEER_TEMPLATE),
            ("reporter", REPORTER_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self { env, budget_bytes }
    }

    pub fn planner(&self, input: &PlannerPrompt<'_>) -> Result<String> {
        self.render(
            "planner",
            context! {
                original => input.original.trim(),
                current => input.current.trim(),
                manifest => input.manifest_json,
                specialists => input.specialists,
                root_env_var => input.root_env_var,
            },
        )
    }

    pub fn auditor(
        &self,
        plan_json: &str,
        manifest_json: &str,
        placeholder: &str,
    ) -> Result<String> {
        self.render(
            "auditor",
            context! {
                plan => plan_json,
                manifest => manifest_json,
                placeholder => placeholder,
            },
        )
    }

    pub fn specialist(&self, task: &str, file_path: &str, contents: &str) -> Result<String> {
        self.render(
            "specialist",
            context! { task => task.trim(), file_path => file_path, contents => contents },
        )
    }

    pub fn programmer(&self, task: &str, file_path: &str, contents: &str) -> Result<String> {
        self.render(
            "programmer",
            context! { task => task.trim(), file_path => file_path, contents => contents },
        )
    }

    pub fn engineer(&self, input: &EngineerPrompt<'_>) -> Result<String> {
        self.render(
            "engineer",
            context! {
                command => input.command,
                stdout => input.stdout.trim_end(),
                stderr => input.stderr.trim_end(),
                previous_fix => input.previous_fix,
            },
        )
    }

    pub fn reporter(&self, input: &ReporterPrompt<'_>) -> Result<String> {
        self.render(
            "reporter",
            context! {
                original => input.original.trim(),
                current => input.current.trim(),
                tool => input.tool,
                succeeded => input.succeeded,
                summary => input.summary.trim(),
                refinement => input.refinement,
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let rendered = self.env.get_template(name)?.render(ctx)?;
        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}

/// A section of rendered template output.
#[derive(Debug, Clone)]
struct Section {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<Section> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());
    for (idx, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(Section {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn apply_budget(sections: &mut [Section], budget: usize) {
    let mut order: Vec<usize> = (0..sections.len())
        .filter(|&idx| !sections[idx].required)
        .collect();
    order.sort_by_key(|&idx| std::cmp::Reverse(sections[idx].content.len()));

    for idx in order {
        let current_total = total_len(sections);
        if current_total <= budget {
            break;
        }
        let section = &mut sections[idx];
        let excess = current_total - budget;
        let keep = section
            .content
            .len()
            .saturating_sub(excess)
            .max(MIN_SECTION_BYTES);
        if keep >= section.content.len() {
            continue;
        }
        let cut = floor_char_boundary(&section.content, keep);
        let dropped = section.content.len() - cut;
        section.content.truncate(cut);
        section
            .content
            .push_str(&format!("\n[truncated {dropped} bytes]"));
        debug!(section = %section.key, dropped, "truncated prompt section for budget");
    }
}

fn total_len(sections: &[Section]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    (0..=index)
        .rev()
        .find(|&idx| text.is_char_boundary(idx))
        .unwrap_or(0)
}

fn render_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner_input<'a>(manifest: &'a str) -> PlannerPrompt<'a> {
        PlannerPrompt {
            original: "make the tests pass",
            current: "fix the import error",
            manifest_json: manifest,
            specialists: vec!["CodeAnalystAgent", "SecurityReviewAgent"],
            root_env_var: "REFINER_ROOT",
        }
    }

    #[test]
    fn planner_sections_are_ordered() {
        let prompt = Prompts::new(60_000)
            .planner(&planner_input("[\"README.md\"]"))
            .expect("render");
        let contract = prompt.find("### Planner Contract").expect("contract");
        let original = prompt.find("### Original Problem").expect("original");
        let current = prompt.find("### Current Refinement").expect("current");
        let manifest = prompt.find("### File Manifest").expect("manifest");
        assert!(contract < original && original < current && current < manifest);
        assert!(prompt.contains("CodeAnalystAgent, SecurityReviewAgent"));
        assert!(!prompt.contains("<!--"), "markers are stripped");
    }

    #[test]
    fn budget_truncates_trimmable_sections_only() {
        let manifest = "x".repeat(5_000);
        let prompt = Prompts::new(2_000)
            .planner(&planner_input(&manifest))
            .expect("render");
        assert!(prompt.contains("[truncated"));
        assert!(prompt.contains("make the tests pass"));
        assert!(prompt.contains("fix the import error"));
        assert!(prompt.len() < 5_000);
    }

    #[test]
    fn programmer_file_is_never_truncated() {
        let contents = "line\n".repeat(2_000);
        let prompt = Prompts::new(500)
            .programmer("rename foo", "src/lib.rs", &contents)
            .expect("render");
        assert!(prompt.contains(contents.trim()));
        assert!(!prompt.contains("[truncated"));
    }

    #[test]
    fn engineer_previous_attempt_is_conditional() {
        let prompts = Prompts::new(60_000);
        let first = prompts
            .engineer(&EngineerPrompt {
                command: "mypy .",
                stdout: "",
                stderr: "mypy: not found",
                previous_fix: None,
            })
            .expect("render");
        assert!(!first.contains("### Previous Attempt"));

        let second = prompts
            .engineer(&EngineerPrompt {
                command: "mypy .",
                stdout: "",
                stderr: "mypy: not found",
                previous_fix: Some("pip install mypy"),
            })
            .expect("render");
        assert!(second.contains("### Previous Attempt"));
        assert!(second.contains("pip install mypy"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut sections = vec![Section {
            key: "body".to_string(),
            required: false,
            content: "é".repeat(400),
        }];
        apply_budget(&mut sections, 300);
        assert!(sections[0].content.contains("[truncated"));
    }
}
