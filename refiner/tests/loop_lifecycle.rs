//! End-to-end loop scenarios against a temp project.
//!
//! Uses scripted oracle and shell doubles so every planner, auditor and
//! reporter reply is deterministic, while file tools hit the real filesystem.

use std::fs;

use refiner::core::types::{Phase, Report};
use refiner::looping::{LoopStop, run_loop};
use refiner::step::{StepOutcome, StepTransition};
use refiner::test_support::{ScriptedOracle, ScriptedShell, TestHarness, shell_fail, shell_ok};

const PASS: &str = r#"{"passed": true, "reason": "plan matches manifest"}"#;

#[test]
fn create_over_existing_file_halts_with_reason_verbatim() {
    let harness = TestHarness::new();
    harness.write("README.md", "# project\n");
    let oracle = ScriptedOracle::new(vec![(
        "planner",
        r##"{"tool": "create_file", "file_path": "README.md", "content": "# new"}"##,
    )]);
    let shell = ScriptedShell::new(Vec::new());
    let ctx = harness.context(&oracle, &shell);

    let outcome = run_loop(&ctx, "write a readme", |_| {});

    assert_eq!(
        outcome.stop,
        LoopStop::Failed {
            phase: Phase::Audit,
            reason: "file already exists: README.md".to_string()
        }
    );
    assert_eq!(
        fs::read_to_string(harness.root().join("README.md")).expect("read"),
        "# project\n"
    );
    assert_eq!(oracle.calls().len(), 1, "auditor oracle is not consulted");
}

#[test]
fn modify_of_missing_file_halts_in_audit() {
    let harness = TestHarness::new();
    let oracle = ScriptedOracle::new(vec![(
        "planner",
        r#"{"tool": "modify_file", "file_path": "src/app.py", "modification_task": "add main"}"#,
    )]);
    let shell = ScriptedShell::new(Vec::new());
    let ctx = harness.context(&oracle, &shell);

    let outcome = run_loop(&ctx, "add an entry point", |_| {});

    let LoopStop::Failed { phase, reason } = outcome.stop else {
        panic!("expected failure");
    };
    assert_eq!(phase, Phase::Audit);
    assert!(reason.contains("cannot create via modify"));
    assert!(!harness.root().join("src/app.py").exists());
}

#[test]
fn plan_missing_field_never_reaches_an_executor() {
    let harness = TestHarness::new();
    let oracle = ScriptedOracle::new(vec![(
        "planner",
        r#"{"tool": "create_file", "content": "orphan"}"#,
    )]);
    let shell = ScriptedShell::new(Vec::new());
    let ctx = harness.context(&oracle, &shell);

    let outcome = run_loop(&ctx, "create something", |_| {});

    assert!(matches!(
        outcome.stop,
        LoopStop::Failed {
            phase: Phase::Planning,
            ..
        }
    ));
    assert!(shell.commands().is_empty());
    let entries: Vec<_> = fs::read_dir(harness.root())
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != ".refiner")
        .collect();
    assert!(entries.is_empty(), "no files created: {entries:?}");
}

#[test]
fn plain_report_continues_with_fresh_manifest() {
    let harness = TestHarness::new();
    harness.write("README.md", "# project\n");
    let problem = "document the project";
    let stagnate = format!("REFINEMENT: {problem}");
    let oracle = ScriptedOracle::new(vec![
        (
            "planner",
            r#"{"tool": "create_file", "file_path": "docs/usage.md", "content": "Run it."}"#,
        ),
        ("auditor", PASS),
        ("reporter", "File written successfully."),
        ("planner", r#"{"tool": "execute_shell", "command": "ls docs"}"#),
        ("auditor", PASS),
        ("reporter", stagnate.as_str()),
    ]);
    let shell = ScriptedShell::new(vec![shell_ok("usage.md\n")]);
    let ctx = harness.context(&oracle, &shell);

    let mut steps: Vec<StepOutcome> = Vec::new();
    let outcome = run_loop(&ctx, problem, |step| steps.push(step.clone()));

    assert_eq!(steps.len(), 2);
    assert_eq!(
        steps[0].report,
        Some(Report::Plain("File written successfully.".to_string()))
    );
    assert!(matches!(steps[0].transition, StepTransition::Unchanged { .. }));
    assert_eq!(steps[1].problem, problem, "current unchanged after plain report");
    assert_eq!(steps[0].manifest_len, 1);
    assert_eq!(steps[1].manifest_len, 2, "manifest rebuilt with the new file");

    let second_planner_prompt = &oracle.calls()[3].prompt;
    assert!(second_planner_prompt.contains("docs/usage.md"));

    assert_eq!(
        outcome.stop,
        LoopStop::Stagnated {
            statement: problem.to_string()
        }
    );
}

#[test]
fn shell_self_repair_inside_loop_then_refinement_chain() {
    let harness = TestHarness::new();
    let oracle = ScriptedOracle::new(vec![
        ("planner", r#"{"tool": "execute_shell", "command": "pytest"}"#),
        ("auditor", PASS),
        ("engineer", "pip install pytest"),
        ("engineer", "python3 -m pytest"),
        ("reporter", "REFINEMENT: fix the two failing tests"),
        ("planner", r#"{"tool": "execute_shell", "command": "python3 -m pytest -x"}"#),
        ("auditor", PASS),
        ("reporter", "REFINEMENT: fix the two failing tests"),
    ]);
    let shell = ScriptedShell::new(vec![
        shell_fail(127, "", "pytest: not found"),
        shell_ok("Successfully installed pytest\n"),
        shell_fail(127, "", "pytest: not found"),
        shell_ok("2 failed, 10 passed\n"),
        shell_ok("1 failed\n"),
    ]);
    let ctx = harness.context(&oracle, &shell);

    let outcome = run_loop(&ctx, "make the test suite pass", |_| {});

    assert_eq!(
        shell.commands(),
        [
            "pytest",
            "pip install pytest",
            "pytest",
            "python3 -m pytest",
            "python3 -m pytest -x"
        ]
    );
    assert_eq!(outcome.iterations, 2);
    assert_eq!(
        outcome.stop,
        LoopStop::Stagnated {
            statement: "fix the two failing tests".to_string()
        }
    );
    assert_eq!(outcome.state.original, "make the test suite pass");
    assert_eq!(oracle.remaining(), 0);
}

#[test]
fn analysis_findings_reach_the_reporter_as_refinement() {
    let mut harness = TestHarness::new();
    harness.config.max_iterations = 1;
    let oracle = ScriptedOracle::new(vec![
        ("planner", r#"{"tool": "execute_shell", "command": "ruff check ."}"#),
        ("auditor", PASS),
        ("engineer", "SUCCESS"),
        ("reporter", "REFINEMENT:"),
    ]);
    let shell = ScriptedShell::new(vec![shell_fail(1, "app.py:1:1: F401 unused import\n", "")]);
    let ctx = harness.context(&oracle, &shell);

    let mut steps: Vec<StepOutcome> = Vec::new();
    let outcome = run_loop(&ctx, "clean up lint", |step| steps.push(step.clone()));

    assert_eq!(outcome.stop, LoopStop::BudgetExhausted { iterations: 1 });
    let execution = steps[0].execution.as_ref().expect("execution");
    let refinement = execution.refinement.as_deref().expect("refinement");
    assert!(refinement.starts_with("The analysis tool ran successfully and found issues."));
    assert!(refinement.ends_with("app.py:1:1: F401 unused import"));
    assert_eq!(
        steps[0].report,
        Some(Report::Refinement(refinement.to_string())),
        "unusable report falls back to the tool's refinement"
    );
    assert_eq!(outcome.state.current, refinement);
}

#[test]
fn transcripts_record_every_iteration() {
    let harness = TestHarness::new();
    let oracle = ScriptedOracle::new(vec![
        ("planner", r#"{"tool": "execute_shell", "command": "echo hi"}"#),
        ("auditor", PASS),
        ("reporter", "REFINEMENT: say hi"),
    ]);
    let shell = ScriptedShell::new(vec![shell_ok("hi\n")]);
    let ctx = harness.context(&oracle, &shell);

    let outcome = run_loop(&ctx, "say hi", |_| {});

    let dir = harness
        .root()
        .join(".refiner/runs")
        .join(&outcome.run_id)
        .join("1");
    for name in ["meta.json", "plan.json", "audit.json", "execution.json", "report.txt"] {
        assert!(dir.join(name).exists(), "missing {name}");
    }
    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("meta.json")).expect("read"))
            .expect("json");
    assert_eq!(meta["outcome"], "stagnated");
    assert_eq!(meta["problem"], "say hi");
}
