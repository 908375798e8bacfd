//! Per-invocation worker state.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::config::WorkerConfig;
use crate::output::{self, Sanitizer};
use crate::sink::MessageSink;
use crate::workitem::{RecordFields, RecordFilter, Workitem};

/// Worker for a single action invocation.
///
/// Owns the workitem while the action runs, buffers output and turns the
/// protocol operations (waiting, cancel, persistence requests) into
/// messages on the sink.
pub struct Worker {
    action: String,
    workitem: Workitem,
    sink: Arc<dyn MessageSink>,
    mock: bool,
    flush_interval: Duration,
    buffer: Vec<u8>,
    last_flush: Option<Instant>,
}

impl Worker {
    /// Create a worker for `action` operating on `workitem`.
    pub fn new(
        action: impl Into<String>,
        workitem: Workitem,
        sink: Arc<dyn MessageSink>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            action: action.into(),
            workitem,
            sink,
            mock: config.mock,
            flush_interval: config.flush_interval,
            buffer: Vec::new(),
            last_flush: None,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn workitem(&self) -> &Workitem {
        &self.workitem
    }

    pub fn workitem_mut(&mut self) -> &mut Workitem {
        &mut self.workitem
    }

    pub fn into_workitem(self) -> Workitem {
        self.workitem
    }

    pub fn is_mock(&self) -> bool {
        self.mock
    }

    // ── Output ──────────────────────────────────────────────────────────

    /// Append text to the output buffer and send it to the server.
    ///
    /// With `buffer` set the text is held back until the flush interval has
    /// passed since the previous flush. A multi-byte character split across
    /// writes stays buffered until its remaining bytes arrive.
    pub async fn write_output(&mut self, text: impl AsRef<[u8]>, buffer: bool) {
        let last_flush = *self.last_flush.get_or_insert_with(Instant::now);
        self.buffer.extend_from_slice(text.as_ref());

        if !buffer || last_flush.elapsed() > self.flush_interval {
            self.flush(true).await;
        }
    }

    /// Send whatever is buffered right away, including a truncated trailing
    /// character. No-op when the buffer is empty.
    pub async fn flush_output(&mut self) {
        self.flush(false).await;
    }

    async fn flush(&mut self, hold_partial: bool) {
        let held = if hold_partial {
            output::incomplete_tail(&self.buffer)
        } else {
            0
        };
        let ready = self.buffer.len() - held;
        if ready == 0 {
            return;
        }

        let (text, used) = output::sanitize(&self.buffer[..ready]);
        if used != Sanitizer::AsIs {
            tracing::warn!(
                action = %self.action,
                strategy = used.name(),
                "Output could not be sent as-is, sanitized before sending"
            );
        }
        let text = text.into_owned();
        self.buffer.drain(..ready);
        self.last_flush = Some(Instant::now());

        if self.mock {
            self.workitem
                .envelope
                .output
                .get_or_insert_with(String::new)
                .push_str(&text);
            return;
        }

        self.workitem.envelope.output = Some(text);
        self.workitem.envelope.streaming = Some(true);
        if let Err(e) = self.sink.send(&self.workitem).await {
            tracing::warn!(action = %self.action, error = %e, "Unable to write output to server");
        }
        self.workitem.envelope.streaming = None;
    }

    /// Output not yet flushed.
    pub fn buffered_output(&self) -> &[u8] {
        &self.buffer
    }

    /// Everything written so far. Only retained in mock mode.
    pub fn output(&self) -> Option<&str> {
        if !self.mock {
            tracing::warn!("Output is only retained in mock mode");
            return None;
        }
        self.workitem.envelope.output.as_deref()
    }

    // ── Fields ──────────────────────────────────────────────────────────

    pub fn fields(&self) -> &Map<String, Value> {
        &self.workitem.fields
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.workitem.fields
    }

    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.workitem.get_field(name)
    }

    /// Field value, or `default` when absent or empty.
    pub fn get_field_or(&self, name: &str, default: impl Into<Value>) -> Value {
        self.workitem.get_field_or(name, default.into())
    }

    pub fn get_int_field(&self, name: &str, default: i64) -> i64 {
        self.workitem.get_int_field(name, default)
    }

    pub fn get_boolean_field(&self, name: &str) -> bool {
        self.workitem.get_boolean_field(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.workitem.set_field(name, value);
    }

    pub fn save_output_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.workitem.save_output_value(name, value);
    }

    pub fn read_output_value(&self, name: &str) -> Option<&Value> {
        self.workitem.read_output_value(name)
    }

    pub fn add_link(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.workitem.add_link(name, url);
    }

    pub fn error(&self) -> Option<&str> {
        self.workitem.error()
    }

    pub fn has_error(&self) -> bool {
        self.workitem.has_error()
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.workitem.set_error(error);
    }

    // ── Control ─────────────────────────────────────────────────────────

    /// Mark the task as waiting (or no longer waiting).
    ///
    /// A `true` flag stays on the workitem after the send so the
    /// orchestrator keeps treating the task as pending.
    pub async fn set_waiting(&mut self, should_wait: bool) {
        self.workitem.envelope.waiting = Some(should_wait);
        self.send_workitem("waiting").await;
        if !should_wait {
            self.workitem.envelope.waiting = None;
        }
    }

    /// Ask the orchestrator to cancel the surrounding workflow step.
    pub async fn cancel(&mut self) {
        self.workitem.envelope.cancel = Some(true);
        self.send_workitem("cancel").await;
        self.workitem.envelope.cancel = None;
    }

    /// Tell the orchestrator this task's result is not needed.
    pub async fn not_needed(&mut self) {
        self.workitem.envelope.not_needed = Some(true);
        self.send_workitem("not needed").await;
        self.workitem.envelope.not_needed = None;
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Request creation of a `model` record.
    pub async fn create_record_with_fields(
        &mut self,
        model: impl Into<String>,
        fields: impl Into<RecordFields>,
    ) {
        let envelope = &mut self.workitem.envelope;
        envelope.persist = Some(true);
        envelope.create = Some(true);
        envelope.model = Some(model.into());

        match fields.into() {
            RecordFields::Map(map) => {
                envelope.record_fields = Some(Value::Object(map));
                envelope.record_values = None;
            }
            RecordFields::Columns { names, values } => {
                tracing::warn!(
                    "deprecation: create_record_with_fields should be called with a field map"
                );
                envelope.record_fields = Some(Value::String(names.join(",")));
                envelope.record_values = Some(Value::String(values.join(",")));
            }
        }

        self.send_workitem("create record").await;
        self.workitem.envelope.clear_persist_markers();
    }

    /// Request an update of one field of a `model` record.
    pub async fn update_fields_in_record(
        &mut self,
        model: impl Into<String>,
        name_or_id: impl ToString,
        record_field: impl Into<String>,
        record_value: impl Into<Value>,
    ) {
        let envelope = &mut self.workitem.envelope;
        envelope.persist = Some(true);
        envelope.update = Some(true);
        envelope.model = Some(model.into());
        envelope.record_id = Some(name_or_id.to_string());
        envelope.record_field = Some(record_field.into());
        envelope.record_value = Some(record_value.into());

        self.send_workitem("update record").await;
        self.workitem.envelope.clear_persist_markers();
    }

    /// Request deletion of the `model` records matching `filter`.
    pub async fn delete_record(
        &mut self,
        model: impl Into<String>,
        filter: impl Into<RecordFilter>,
    ) {
        let envelope = &mut self.workitem.envelope;
        envelope.persist = Some(true);
        envelope.delete = Some(true);
        envelope.model = Some(model.into());

        match filter.into() {
            RecordFilter::Filter(map) => envelope.filter = Some(map),
            RecordFilter::Name(name) => {
                tracing::warn!("deprecation: delete_record should be called with a filter map");
                envelope.name = Some(name);
            }
        }

        self.send_workitem("delete record").await;
        self.workitem.envelope.clear_persist_markers();
    }

    /// Send the workitem unless mocked. Failures are logged, never raised.
    async fn send_workitem(&self, kind: &str) {
        if self.mock {
            return;
        }
        if let Err(e) = self.sink.send(&self.workitem).await {
            tracing::warn!(
                action = %self.action,
                kind,
                error = %e,
                "Failed to send message to server"
            );
        }
    }
}
