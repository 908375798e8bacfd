//! Message sinks: the channel that carries workitem snapshots to the
//! orchestrator.

pub mod channel;
pub mod memory;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::workitem::Workitem;

pub use channel::ChannelSink;
pub use memory::RecordingSink;

/// Transmits a workitem snapshot to the orchestrating server.
///
/// Callers treat every error as non-fatal: a failed status update is logged
/// and the task keeps running.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send the current state of the workitem.
    async fn send(&self, workitem: &Workitem) -> Result<(), SinkError>;
}

/// Sink that only logs. Stand-in for hosts that do not stream status.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageSink for LogSink {
    async fn send(&self, workitem: &Workitem) -> Result<(), SinkError> {
        tracing::debug!(
            output = workitem.envelope.output.as_deref().unwrap_or(""),
            "Sent workitem stream"
        );
        Ok(())
    }
}
