//! Participant: the plugin definition and its `perform` lifecycle.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::config::WorkerConfig;
use crate::error::{ActionError, capture_panic_traces, take_panic_trace};
use crate::sink::MessageSink;
use crate::worker::registry::{Action, ActionRegistry};
use crate::worker::Worker;
use crate::workitem::Workitem;

/// Frames at and beyond this symbol belong to the host, not the action.
const TRACE_BOUNDARY: &str = "participant::Participant";

/// Symbols of the frames that record a trace rather than raise the error.
const CAPTURE_FRAMES: &[&str] = &[
    "std::backtrace",
    "panicking",
    "rust_begin_unwind",
    "__rust_end_short_backtrace",
    "core::ops::function",
    "anyhow::",
    "workitem_worker::error",
];

/// Notification hook for unexpected errors. Cannot suppress the error.
pub type ExceptionHandler = Arc<dyn Fn(&ActionError, &Worker) + Send + Sync>;

/// Hook run after an action completed successfully.
pub type CompletionHandler = Arc<dyn Fn(&mut Workitem) + Send + Sync>;

/// Lifecycle callbacks. At most one of each; the last registration wins.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_exception: Option<ExceptionHandler>,
    pub on_complete: Option<CompletionHandler>,
}

/// A plugin: named actions plus lifecycle callbacks, configuration and the
/// sink its workers report through.
///
/// Immutable once built, so it can be shared between concurrent
/// invocations.
pub struct Participant {
    name: String,
    actions: ActionRegistry,
    callbacks: Callbacks,
    sink: Arc<dyn MessageSink>,
    config: WorkerConfig,
}

impl Participant {
    pub fn new(name: impl Into<String>, sink: Arc<dyn MessageSink>, config: WorkerConfig) -> Self {
        capture_panic_traces();
        Self {
            name: name.into(),
            actions: ActionRegistry::new(),
            callbacks: Callbacks::default(),
            sink,
            config,
        }
    }

    /// Register an action under `name`.
    pub fn action(mut self, name: impl Into<String>, action: impl Action + 'static) -> Self {
        self.actions.register(name, Arc::new(action));
        self
    }

    /// Register a closure action under `name`.
    pub fn action_fn<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Worker) -> BoxFuture<'a, Result<(), ActionError>>
            + Send
            + Sync
            + 'static,
    {
        self.actions.register_fn(name, f);
        self
    }

    /// Register the unexpected-error hook.
    pub fn on_exception<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ActionError, &Worker) + Send + Sync + 'static,
    {
        self.callbacks.on_exception = Some(Arc::new(handler));
        self
    }

    /// Register the completion hook.
    pub fn on_complete<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Workitem) + Send + Sync + 'static,
    {
        self.callbacks.on_complete = Some(Arc::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Perform `action` on `workitem`, mutating it in place.
    ///
    /// Never fails: the outcome is reported through `fields.__error__`.
    /// Buffered output is flushed before the result is recorded, and the
    /// workitem is handed back on every path.
    pub async fn perform(&self, action: &str, workitem: &mut Workitem) {
        tracing::info!(participant = %self.name, action, "Performing action");

        let mut worker = Worker::new(
            action,
            std::mem::take(workitem),
            Arc::clone(&self.sink),
            &self.config,
        );

        let outcome = AssertUnwindSafe(self.run_action(action, &mut worker))
            .catch_unwind()
            .await;
        if let Err(payload) = outcome {
            let err = ActionError::from_panic(payload);
            tracing::error!(
                participant = %self.name,
                action,
                error = %err,
                "Panic while recording action result"
            );
            worker.set_error(format!("Unexpected error executing task: {err}"));
        }

        *workitem = worker.into_workitem();
    }

    async fn run_action(&self, action: &str, worker: &mut Worker) {
        take_panic_trace();

        let result = match self.actions.resolve(action) {
            Ok(handler) => AssertUnwindSafe(handler.run(worker))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(ActionError::from_panic(payload))),
            Err(e) => Err(e),
        };

        worker.flush_output().await;

        match result.and_then(|()| self.complete(worker)) {
            Ok(()) => {
                tracing::info!(participant = %self.name, action, "Action completed");
            }
            Err(ActionError::UnknownAction(name)) => {
                tracing::error!(participant = %self.name, action = %name, "Unknown action");
                worker.set_error(format!("Unknown action: {name}"));
            }
            Err(ActionError::Plugin(message)) | Err(ActionError::Config(message)) => {
                tracing::info!(
                    participant = %self.name,
                    action,
                    error = %message,
                    "Action reported an error"
                );
                worker.set_error(message);
            }
            Err(err @ ActionError::Unexpected { .. }) => {
                let diagnostic = self.report_unexpected(&err, worker);
                worker.set_error(diagnostic);
            }
        }
    }

    /// Run the completion hook. A panic in the hook counts as an unexpected
    /// error of the action.
    fn complete(&self, worker: &mut Worker) -> Result<(), ActionError> {
        let Some(handler) = &self.callbacks.on_complete else {
            return Ok(());
        };
        std::panic::catch_unwind(AssertUnwindSafe(|| handler(worker.workitem_mut())))
            .map_err(ActionError::from_panic)
    }

    /// Log an unexpected error, notify the exception hook and build the
    /// message recorded on the workitem.
    fn report_unexpected(&self, err: &ActionError, worker: &Worker) -> String {
        let ActionError::Unexpected {
            kind,
            message,
            trace,
        } = err
        else {
            return err.to_string();
        };

        tracing::error!(
            participant = %self.name,
            action = worker.action(),
            kind = %kind,
            error = %message,
            trace = trace.as_deref().unwrap_or("<no backtrace captured>"),
            "Unexpected error executing task"
        );

        let hook_result = match &self.callbacks.on_exception {
            Some(handler) => std::panic::catch_unwind(AssertUnwindSafe(|| handler(err, worker))),
            None => Ok(()),
        };
        if let Err(payload) = hook_result {
            let hook_err = ActionError::from_panic(payload);
            tracing::error!(
                participant = %self.name,
                action = worker.action(),
                error = %hook_err,
                "Exception handler panicked"
            );
        }

        let mut diagnostic = format!("Unexpected error executing task: {kind} {message}");
        if let Some(trace) = trace {
            let trimmed = trim_trace(trace);
            if !trimmed.is_empty() {
                diagnostic.push('\n');
                diagnostic.push_str(&trimmed);
            }
        }
        diagnostic
    }
}

/// Keep only the frames raised inside the action.
///
/// Leading frames from the capture machinery (backtrace capture, panic
/// handling, error construction) are dropped, and so is everything from the
/// first participant frame outward.
pub fn trim_trace(trace: &str) -> String {
    frames(trace)
        .into_iter()
        .skip_while(|frame| is_capture_frame(frame[0]))
        .take_while(|frame| !frame[0].contains(TRACE_BOUNDARY))
        .flatten()
        .collect::<Vec<_>>()
        .join("\n")
}

/// Group backtrace lines into frames: a numbered header plus its `at` lines.
fn frames(trace: &str) -> Vec<Vec<&str>> {
    let mut frames: Vec<Vec<&str>> = Vec::new();
    for line in trace.lines() {
        match frames.last_mut() {
            Some(frame) if !is_frame_header(line) => frame.push(line),
            _ => frames.push(vec![line]),
        }
    }
    frames
}

fn is_frame_header(line: &str) -> bool {
    line.trim_start()
        .split_once(':')
        .is_some_and(|(n, _)| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn is_capture_frame(header: &str) -> bool {
    CAPTURE_FRAMES.iter().any(|marker| header.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::sink::RecordingSink;
    use serde_json::json;

    fn participant(sink: Arc<RecordingSink>) -> Participant {
        Participant::new("test", sink, WorkerConfig::default())
            .action_fn("ok", |w| {
                Box::pin(async move {
                    w.set_field("done", true);
                    Ok(())
                })
            })
            .action_fn("bad_input", |w| {
                Box::pin(async move {
                    w.write_output("checking input\n", true).await;
                    Err(ActionError::plugin("Missing field: host"))
                })
            })
            .action_fn("bad_config", |_| {
                Box::pin(async move { Err(ActionError::config("No credentials configured")) })
            })
            .action_fn("io_failure", |_| {
                Box::pin(async move {
                    Err(ActionError::from(std::io::Error::other("disk on fire")))
                })
            })
            .action_fn("panics", |_| Box::pin(async move { explode() }))
            .action_fn("manifest", |_| Box::pin(async move { read_manifest() }))
    }

    fn explode() -> Result<(), ActionError> {
        panic!("kaboom")
    }

    fn read_manifest() -> Result<(), ActionError> {
        Err(ActionError::from(std::io::Error::other("manifest missing")))
    }

    #[tokio::test]
    async fn test_successful_action() {
        let sink = RecordingSink::new();
        let mut item = Workitem::new();

        participant(sink.clone()).perform("ok", &mut item).await;

        assert_eq!(item.fields["done"], json!(true));
        assert!(!item.has_error());
        assert_eq!(sink.count().await, 0);
    }

    #[tokio::test]
    async fn test_plugin_error_is_reported_verbatim() {
        let sink = RecordingSink::new();
        let mut item = Workitem::new();

        participant(sink.clone()).perform("bad_input", &mut item).await;

        assert_eq!(item.error(), Some("Missing field: host"));
        // Buffered output is flushed before the error is recorded
        assert_eq!(sink.outputs().await, vec!["checking input\n"]);
    }

    #[tokio::test]
    async fn test_plugin_error_without_output_sends_nothing() {
        let sink = RecordingSink::new();
        let mut item = Workitem::new();

        participant(sink.clone()).perform("bad_config", &mut item).await;

        assert_eq!(item.error(), Some("No credentials configured"));
        assert_eq!(item.envelope.output, None);
        assert_eq!(sink.count().await, 0);
    }

    #[tokio::test]
    async fn test_unexpected_error() {
        let sink = RecordingSink::new();
        let mut item = Workitem::new();

        participant(sink).perform("io_failure", &mut item).await;

        let error = item.error().unwrap();
        assert!(error.starts_with("Unexpected error executing task"));
        assert!(error.contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_panic_is_unexpected_error() {
        let sink = RecordingSink::new();
        let mut item = Workitem::new();

        participant(sink).perform("panics", &mut item).await;

        let error = item.error().unwrap();
        assert!(error.contains("Unexpected error executing task"));
        assert!(error.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_unexpected_error_records_action_frames() {
        let mut item = Workitem::new();

        participant(RecordingSink::new()).perform("manifest", &mut item).await;

        let error = item.error().unwrap();
        let (headline, trace) = error.split_once('\n').unwrap();
        assert!(headline.contains("manifest missing"));
        assert!(trace.contains("read_manifest"));
        assert!(!trace.contains("force_capture"));
        assert!(!trace.contains("participant::Participant"));
    }

    #[tokio::test]
    async fn test_panic_records_frames_from_panic_site() {
        let mut item = Workitem::new();

        participant(RecordingSink::new()).perform("panics", &mut item).await;

        let error = item.error().unwrap();
        let (_, trace) = error.split_once('\n').unwrap();
        assert!(trace.contains("explode"));
        assert!(!trace.contains("rust_begin_unwind"));
        assert!(!trace.contains("participant::Participant"));
    }

    #[tokio::test]
    async fn test_panicking_complete_hook_is_unexpected_error() {
        let participant =
            participant(RecordingSink::new()).on_complete(|_| panic!("hook blew up"));
        let mut item = Workitem::from_value(json!({"fields": {"keep": 1}})).unwrap();

        participant.perform("ok", &mut item).await;

        assert_eq!(item.fields["keep"], json!(1));
        assert_eq!(item.fields["done"], json!(true));
        let error = item.error().unwrap();
        assert!(error.starts_with("Unexpected error executing task"));
        assert!(error.contains("hook blew up"));
    }

    #[tokio::test]
    async fn test_panicking_exception_hook_still_records_error() {
        let participant =
            participant(RecordingSink::new()).on_exception(|_, _| panic!("hook blew up"));
        let mut item = Workitem::from_value(json!({"fields": {"keep": 1}})).unwrap();

        participant.perform("io_failure", &mut item).await;

        assert_eq!(item.fields["keep"], json!(1));
        let error = item.error().unwrap();
        assert!(error.contains("disk on fire"));
        assert!(!error.contains("hook blew up"));
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let sink = RecordingSink::new();
        let mut item = Workitem::new();

        participant(sink).perform("deploy", &mut item).await;

        assert_eq!(item.error(), Some("Unknown action: deploy"));
    }

    #[tokio::test]
    async fn test_exception_hook_only_for_unexpected_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sink = RecordingSink::new();
        let participant = participant(sink).on_exception(move |err, worker| {
            assert!(matches!(err, ActionError::Unexpected { .. }));
            assert_eq!(worker.action(), "io_failure");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut item = Workitem::new();
        participant.perform("bad_input", &mut item).await;
        participant.perform("ok", &mut Workitem::new()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let mut item = Workitem::new();
        participant.perform("io_failure", &mut item).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The hook is a notification; the error is still recorded
        assert!(item.error().unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_complete_hook_runs_after_success_only() {
        let sink = RecordingSink::new();
        let participant = participant(sink).on_complete(|item| {
            item.set_field("completed", true);
        });

        let mut item = Workitem::new();
        participant.perform("ok", &mut item).await;
        assert_eq!(item.fields["completed"], json!(true));

        let mut item = Workitem::new();
        participant.perform("bad_input", &mut item).await;
        assert!(item.get_field("completed").is_none());
    }

    #[tokio::test]
    async fn test_last_callback_registration_wins() {
        let sink = RecordingSink::new();
        let participant = participant(sink)
            .on_complete(|item| item.set_field("hook", "first"))
            .on_complete(|item| item.set_field("hook", "second"));

        let mut item = Workitem::new();
        participant.perform("ok", &mut item).await;
        assert_eq!(item.fields["hook"], json!("second"));
    }

    #[tokio::test]
    async fn test_unknown_top_level_keys_survive() {
        let sink = RecordingSink::new();
        let mut item =
            Workitem::from_value(json!({"fields": {}, "composition": "nightly"})).unwrap();

        participant(sink).perform("ok", &mut item).await;

        assert_eq!(item.extra["composition"], json!("nightly"));
    }

    #[tokio::test]
    async fn test_mocked_participant_keeps_output() {
        let participant = Participant::new("test", RecordingSink::new(), WorkerConfig::mocked())
            .action_fn("talk", |w| {
                Box::pin(async move {
                    w.write_output("one ", true).await;
                    w.write_output("two", true).await;
                    Ok(())
                })
            });

        let mut item = Workitem::new();
        participant.perform("talk", &mut item).await;
        assert_eq!(item.envelope.output.as_deref(), Some("one two"));
    }

    #[test]
    fn test_trim_trace() {
        let trace = "   0: std::backtrace::Backtrace::force_capture\n             \
                     at /rustc/library/std/src/backtrace.rs:312\n   \
                     1: workitem_worker::error::ActionError::unexpected\n   \
                     2: my_plugin::Deploy::run\n             at src/deploy.rs:10\n   \
                     3: workitem_worker::worker::participant::Participant::perform\n   \
                     4: tokio::runtime::park";
        let trimmed = trim_trace(trace);
        assert!(trimmed.trim_start().starts_with("2: my_plugin::Deploy::run"));
        assert!(!trimmed.contains("force_capture"));
        assert!(!trimmed.contains("backtrace.rs"));
        assert!(trimmed.contains("Deploy::run"));
        assert!(trimmed.contains("src/deploy.rs:10"));
        assert!(!trimmed.contains("Participant::perform"));
        assert!(!trimmed.contains("tokio::runtime"));
    }
}
