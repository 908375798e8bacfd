//! Workitem Worker: toolkit for writing workflow participants.
//!
//! A [`Participant`] holds named actions. The orchestrator hands it a
//! [`Workitem`] and an action name; the action runs against a [`Worker`]
//! that buffers output, talks to the server through a [`MessageSink`] and
//! records any failure in the workitem's `__error__` field.

pub mod builtin;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod shell;
pub mod sink;
pub mod testing;
pub mod worker;
pub mod workitem;

pub use config::WorkerConfig;
pub use error::{ActionError, Error, Result};
pub use sink::{ChannelSink, LogSink, MessageSink, RecordingSink};
pub use worker::{Action, Participant, Worker};
pub use workitem::Workitem;
