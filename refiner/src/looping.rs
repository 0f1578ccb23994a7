//! The refinement loop driver.

use tracing::{info, instrument};

use crate::core::state::LoopState;
use crate::core::types::Phase;
use crate::io::transcript::new_run_id;
use crate::step::{LoopContext, StepOutcome, StepTransition, run_step};

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// A refinement repeated the current problem statement: the work converged.
    Stagnated { statement: String },
    /// An iteration failed; carries the phase and the reason verbatim.
    Failed { phase: Phase, reason: String },
    /// `max_iterations` ran without convergence or failure.
    BudgetExhausted { iterations: u32 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub run_id: String,
    pub iterations: u32,
    pub stop: LoopStop,
    pub state: LoopState,
}

/// Drive plan → audit → execute → report iterations for `problem` until the
/// refinement stagnates, an iteration fails, or the iteration budget runs out.
///
/// Infallible: every failure is reported through [`LoopStop::Failed`].
#[instrument(skip_all, fields(max_iterations = ctx.config.max_iterations))]
pub fn run_loop<F: FnMut(&StepOutcome)>(
    ctx: &LoopContext<'_>,
    problem: &str,
    mut on_step: F,
) -> LoopOutcome {
    let run_id = new_run_id();
    let mut state = LoopState::new(problem.trim());
    info!(%run_id, "starting refinement loop");

    while state.iteration < ctx.config.max_iterations {
        let step = run_step(ctx, &mut state, &run_id);
        on_step(&step);
        let stop = match step.transition {
            StepTransition::Refined { .. } | StepTransition::Unchanged { .. } => continue,
            StepTransition::Stagnated { statement } => LoopStop::Stagnated { statement },
            StepTransition::Halted { phase, reason } => LoopStop::Failed { phase, reason },
        };
        info!(iterations = state.iteration, ?stop, "loop stopped");
        return LoopOutcome {
            run_id,
            iterations: state.iteration,
            stop,
            state,
        };
    }

    info!(iterations = state.iteration, "iteration budget exhausted");
    LoopOutcome {
        run_id,
        iterations: state.iteration,
        stop: LoopStop::BudgetExhausted {
            iterations: state.iteration,
        },
        state,
    }
}
