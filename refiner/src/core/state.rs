//! Refinement loop state and its transitions.

use serde::Serialize;

use crate::core::types::Report;

/// Problem statements tracked across iterations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopState {
    /// Problem given at loop start; never changes.
    pub original: String,
    /// Problem the next iteration plans against.
    pub current: String,
    /// Statement `current` replaced most recently. Diagnostic only.
    pub last: Option<String>,
    /// Iterations started so far.
    pub iteration: u32,
}

/// Effect of applying a report to the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `current` was replaced by a new statement.
    Refined,
    /// Plain report; `current` kept for another iteration.
    Unchanged,
    /// The refinement equals `current`; the loop is done.
    Stagnated,
}

impl LoopState {
    pub fn new(problem: impl Into<String>) -> Self {
        let problem = problem.into();
        Self {
            original: problem.clone(),
            current: problem,
            last: None,
            iteration: 0,
        }
    }

    /// Count a new iteration and return its 1-based number.
    pub fn begin_iteration(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    /// Apply the iteration's report. Only a character-equal refinement stagnates.
    pub fn apply_report(&mut self, report: &Report) -> Transition {
        match report {
            Report::Plain(_) => Transition::Unchanged,
            Report::Refinement(next) if *next == self.current => Transition::Stagnated,
            Report::Refinement(next) => {
                let previous = std::mem::replace(&mut self.current, next.clone());
                self.last = Some(previous);
                Transition::Refined
            }
        }
    }
}
