//! Stable exit codes for refiner CLI commands.

/// Command succeeded; for `run`, the refinement converged.
pub const OK: i32 = 0;
/// Invalid usage, config or project root, or another setup error.
pub const INVALID: i32 = 1;
/// The loop halted because an iteration failed.
pub const HALTED_FAILURE: i32 = 2;
/// The loop used every iteration without converging.
pub const BUDGET_EXHAUSTED: i32 = 3;
/// The operator declined the confirmation prompt.
pub const ABORTED: i32 = 4;
