//! Error types for workitem participants.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::sync::Once;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Message sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Shell error: {0}")]
    Shell(#[from] ShellError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

/// Failure raised by an action while a participant performs it.
///
/// `Plugin` and `Config` are expected failures: their message is reported
/// verbatim and no stack trace is logged. Everything else ends up as
/// `Unexpected`, which carries the error kind and a backtrace of where it
/// was raised.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("{0}")]
    Plugin(String),

    #[error("{0}")]
    Config(String),

    #[error("{kind} {message}")]
    Unexpected {
        kind: String,
        message: String,
        trace: Option<String>,
    },
}

impl ActionError {
    /// Create a plugin error (bad input, failed command, ...).
    pub fn plugin(msg: impl Into<String>) -> Self {
        ActionError::Plugin(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        ActionError::Config(msg.into())
    }

    /// Wrap any error as an unexpected failure, capturing a backtrace at the
    /// call site.
    pub fn unexpected<E>(err: E) -> Self
    where
        E: std::error::Error,
    {
        ActionError::Unexpected {
            kind: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            trace: Some(Backtrace::force_capture().to_string()),
        }
    }

    /// Build an unexpected failure from a caught panic payload. Picks up the
    /// backtrace recorded at the panic site when the panic hook from
    /// [`capture_panic_traces`] is installed.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };

        ActionError::Unexpected {
            kind: "panic".to_string(),
            message,
            trace: take_panic_trace(),
        }
    }

    /// Whether this is an expected failure reported without a stack trace.
    pub fn is_plugin_error(&self) -> bool {
        matches!(self, ActionError::Plugin(_) | ActionError::Config(_))
    }
}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        let trace = match err.backtrace().status() {
            BacktraceStatus::Captured => err.backtrace().to_string(),
            _ => Backtrace::force_capture().to_string(),
        };
        ActionError::Unexpected {
            kind: "anyhow::Error".to_string(),
            message: format!("{err:#}"),
            trace: Some(trace),
        }
    }
}

impl From<std::io::Error> for ActionError {
    fn from(err: std::io::Error) -> Self {
        ActionError::unexpected(err)
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        ActionError::unexpected(err)
    }
}

impl From<ShellError> for ActionError {
    fn from(err: ShellError) -> Self {
        ActionError::unexpected(err)
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Install (once per process) a panic hook that records the backtrace of
/// every panic on the panicking thread, then defers to the previous hook.
pub fn capture_panic_traces() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Take the backtrace of the last panic on this thread.
pub fn take_panic_trace() -> Option<String> {
    PANIC_TRACE.with(|slot| slot.borrow_mut().take())
}

/// Errors raised by a message sink while transmitting a workitem.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Message sink is closed")]
    Closed,

    #[error("Transport failed: {0}")]
    Transport(String),

    #[error("Failed to serialize workitem: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the shell runner.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("Script cannot be empty")]
    EmptyScript,

    #[error("No script created; call create_script first")]
    NoScript,

    #[error("Failed to spawn command: {0}")]
    Spawn(String),

    #[error("Command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
