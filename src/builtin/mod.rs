//! Participants shipped with the crate.

pub mod shell;

pub use shell::{ShellAction, shell_participant};
