//! Worker lifecycle: action dispatch, output buffering and protocol
//! messages.
//!
//! Core components:
//! - `worker`: per-invocation state (workitem, output buffer, protocol ops)
//! - `registry`: action name → handler mapping
//! - `participant`: the plugin definition and its `perform` entry point

pub mod participant;
pub mod registry;
pub mod worker;

pub use participant::{Callbacks, CompletionHandler, ExceptionHandler, Participant, trim_trace};
pub use registry::{Action, ActionRegistry, FnAction};
pub use worker::Worker;
