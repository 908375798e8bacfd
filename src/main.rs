use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use workitem_worker::builtin::shell_participant;
use workitem_worker::{ChannelSink, WorkerConfig, Workitem, logging};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = WorkerConfig::from_env()?;
    let _log_guard = logging::init(&config)?;

    let action = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "execute".to_string());

    // Workitem document on stdin; empty input means an empty workitem
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let mut workitem = if input.trim().is_empty() {
        Workitem::new()
    } else {
        serde_json::from_str::<Workitem>(&input)?
    };

    // Every snapshot the worker streams becomes one JSON line on stdout
    let (sink, mut rx) = ChannelSink::new();
    let relay = tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            match serde_json::to_string(&snapshot) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Unable to serialize workitem snapshot"),
            }
        }
    });

    let participant = shell_participant(Arc::new(sink), config);
    participant.perform(&action, &mut workitem).await;

    // Dropping the participant closes the channel and ends the relay
    drop(participant);
    relay.await?;

    println!("{}", serde_json::to_string(&workitem)?);

    // The log guard must drop before the process exits
    if workitem.has_error() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
