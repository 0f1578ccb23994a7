//! Autonomous task-refinement loop.
//!
//! Given a problem statement, the loop repeatedly asks a reasoning oracle for
//! one structured action, audits it against a manifest of the project, runs
//! it against the real filesystem or shell, and asks for a narrower problem
//! statement. It stops when the statement stops changing, when an iteration
//! fails, or when the iteration budget runs out. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (oracle output parsing, fix
//!   classification, loop state). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, subprocesses, oracle
//!   backends, config, transcripts). Isolated behind traits for tests.
//!
//! Orchestration modules ([`audit`], [`repair`], [`dispatch`], [`step`],
//! [`looping`]) coordinate core logic with I/O.

pub mod audit;
pub mod core;
pub mod dispatch;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod repair;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
