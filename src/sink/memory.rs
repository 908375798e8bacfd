//! In-memory sink that records every snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::SinkError;
use crate::sink::MessageSink;
use crate::workitem::Workitem;

/// Keeps a copy of every workitem it is asked to send.
///
/// Can be switched into a failing mode, in which sends are still recorded
/// but reported as transport errors.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: RwLock<Vec<Workitem>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sink whose sends all fail.
    pub fn failing() -> Arc<Self> {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All recorded snapshots, oldest first.
    pub async fn sent(&self) -> Vec<Workitem> {
        self.sent.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.sent.read().await.len()
    }

    pub async fn last(&self) -> Option<Workitem> {
        self.sent.read().await.last().cloned()
    }

    /// Every `__output__` value that was sent, in order.
    pub async fn outputs(&self) -> Vec<String> {
        self.sent
            .read()
            .await
            .iter()
            .filter_map(|w| w.envelope.output.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.write().await.clear();
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, workitem: &Workitem) -> Result<(), SinkError> {
        self.sent.write().await.push(workitem.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_snapshots() {
        let sink = RecordingSink::new();
        let mut item = Workitem::new();
        item.envelope.output = Some("hello".into());

        sink.send(&item).await.unwrap();
        sink.send(&Workitem::new()).await.unwrap();

        assert_eq!(sink.count().await, 2);
        assert_eq!(sink.outputs().await, vec!["hello".to_string()]);
        assert_eq!(sink.last().await, Some(Workitem::new()));

        sink.clear().await;
        assert_eq!(sink.count().await, 0);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let sink = RecordingSink::failing();
        let result = sink.send(&Workitem::new()).await;
        assert!(matches!(result, Err(SinkError::Transport(_))));
        assert_eq!(sink.count().await, 1);

        sink.set_failing(false);
        assert!(sink.send(&Workitem::new()).await.is_ok());
    }
}
