//! Deterministic, pure logic shared by the refinement loop.
//!
//! Core modules must be free of I/O side effects. They interpret oracle text,
//! classify proposals and advance loop state, returning deterministic outputs
//! suitable for tests.

pub mod fix;
pub mod manifest;
pub mod normalize;
pub mod plan;
pub mod report;
pub mod state;
pub mod types;
pub mod verdict;
