//! JSONL output layer.
//!
//! Every event becomes one [`LogLine`]. Fields recorded on enclosing spans are
//! folded into the event's own `fields`, outermost span first, so an entry
//! logged inside the dispatcher's `batch` span carries that batch's `depth`
//! and `batch_len` next to its own `index` and `request_type`. When a span
//! and the event record the same field, the event wins.

use std::io::Write;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// One line of JSONL output.
#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub timestamp: String,
    pub level: &'static str,
    pub service: String,
    pub pid: u32,
    pub target: String,
    pub message: String,
    /// Names of the enclosing spans, outermost first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<&'static str>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

/// Fields recorded on a span, stored in its extensions.
#[derive(Debug, Default)]
struct SpanFields(Map<String, Value>);

/// Collects tracing values as typed JSON.
#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
    message: Option<String>,
}

impl JsonVisitor {
    fn put(&mut self, field: &Field, value: Value) {
        match (field.name(), value) {
            ("message", Value::String(message)) => self.message = Some(message),
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }

    // NaN and infinities become null.
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

/// Layer writing one [`LogLine`] per event to `make_writer`.
pub struct JsonLayer<W> {
    service_name: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service_name: String, make_writer: W) -> Self {
        Self {
            service_name,
            pid: std::process::id(),
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        // Another JsonLayer on the same registry may have recorded already.
        if extensions.get_mut::<SpanFields>().is_some() {
            return;
        }

        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        extensions.insert(SpanFields(visitor.fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = JsonVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(SpanFields(fields)) => fields.extend(visitor.fields),
            None => extensions.insert(SpanFields(visitor.fields)),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut spans = Vec::new();
        let mut fields = Map::new();

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                spans.push(span.name());
                if let Some(SpanFields(span_fields)) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.clone());
                }
            }
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        fields.extend(visitor.fields);

        let metadata = event.metadata();
        let line = LogLine {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: metadata.level().as_str(),
            service: self.service_name.clone(),
            pid: self.pid,
            target: metadata.target().to_string(),
            message: visitor.message.unwrap_or_default(),
            spans,
            fields,
        };

        if let Ok(json) = serde_json::to_string(&line) {
            let _ = writeln!(self.make_writer.make_writer(), "{json}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileLogWriter, WriterFactory};
    use std::path::Path;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(path: &Path, emit: impl FnOnce()) -> Vec<Value> {
        let writer = FileLogWriter::new(path).unwrap();
        let subscriber = tracing_subscriber::registry()
            .with(JsonLayer::new("muxd".to_string(), WriterFactory::new(writer)));
        tracing::subscriber::with_default(subscriber, emit);

        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_event_fields_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let lines = capture(&dir.path().join("events.jsonl"), || {
            tracing::info!(request_type = "echo", index = 2u64, ok = true, "entry completed");
        });

        let line = &lines[0];
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["service"], "muxd");
        assert_eq!(line["message"], "entry completed");
        assert_eq!(line["fields"]["request_type"], "echo");
        assert_eq!(line["fields"]["index"], 2);
        assert_eq!(line["fields"]["ok"], true);
        assert!(line.get("spans").is_none());
    }

    #[test]
    fn test_batch_span_fields_reach_entry_events() {
        let dir = tempfile::tempdir().unwrap();
        let lines = capture(&dir.path().join("events.jsonl"), || {
            let batch = tracing::info_span!(
                target: "muxd_dispatch::dispatch",
                "batch",
                depth = 1u64,
                batch_len = 3u64
            );
            let _entered = batch.enter();
            tracing::info!(
                target: "muxd_dispatch::dispatch",
                index = 0u64,
                request_type = "kv.get",
                "dispatching entry"
            );
        });

        let line = &lines[0];
        assert_eq!(line["target"], "muxd_dispatch::dispatch");
        assert_eq!(line["spans"], serde_json::json!(["batch"]));
        assert_eq!(line["fields"]["depth"], 1);
        assert_eq!(line["fields"]["batch_len"], 3);
        assert_eq!(line["fields"]["index"], 0);
        assert_eq!(line["fields"]["request_type"], "kv.get");
    }

    #[test]
    fn test_nested_spans_inner_and_event_win() {
        let dir = tempfile::tempdir().unwrap();
        let lines = capture(&dir.path().join("events.jsonl"), || {
            let outer = tracing::info_span!("batch", depth = 0u64);
            let _outer = outer.enter();
            let inner = tracing::info_span!("batch", depth = 1u64, caller = tracing::field::Empty);
            inner.record("caller", "alice");
            let _inner = inner.enter();
            tracing::info!(depth = 7u64, "override");
        });

        let line = &lines[0];
        assert_eq!(line["spans"], serde_json::json!(["batch", "batch"]));
        assert_eq!(line["fields"]["caller"], "alice");
        assert_eq!(line["fields"]["depth"], 7);
    }
}
