//! I/O adapters for the refinement loop.

pub mod config;
pub mod fs_tools;
pub mod manifest;
pub mod oracle;
pub mod personas;
pub mod process;
pub mod prompt;
pub mod shell;
pub mod transcript;
