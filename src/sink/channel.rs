//! Sink that forwards snapshots over a tokio channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SinkError;
use crate::sink::MessageSink;
use crate::workitem::Workitem;

/// Forwards a clone of every sent workitem to an mpsc receiver, letting the
/// host relay it to the server on its own task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Workitem>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Workitem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&self, workitem: &Workitem) -> Result<(), SinkError> {
        self.tx
            .send(workitem.clone())
            .map_err(|_| SinkError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forwards_snapshots() {
        let (sink, mut rx) = ChannelSink::new();
        let mut item = Workitem::new();
        item.set_field("step", 1);

        sink.send(&item).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received, item);
    }

    #[tokio::test]
    async fn test_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let result = sink.send(&Workitem::new()).await;
        assert!(matches!(result, Err(SinkError::Closed)));
    }
}
