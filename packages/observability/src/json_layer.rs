//! JSONL layer for feed logs.
//!
//! Each event becomes one JSON object. The correlation fields the feed crates
//! attach (`principal_id`, `subscription`) are lifted to the top level so a
//! single session or subscription can be followed with `jq 'select(...)'`.

use std::io::Write;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::ObservabilityMode;

/// Field names carrying user-authored content. Redacted in
/// [`ObservabilityMode::ProdMetadataOnly`].
pub const REDACTED_FIELDS: &[&str] = &["text", "draft", "display_name", "avatar_url"];

const REDACTED: &str = "[redacted]";

/// One line of the log file.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: &'static str,
    pub service: String,
    pub pid: u32,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

/// Collects event fields, redacting content as it goes.
struct EntryVisitor {
    redact: bool,
    message: String,
    fields: Map<String, Value>,
}

impl EntryVisitor {
    fn new(mode: ObservabilityMode) -> Self {
        Self {
            redact: mode == ObservabilityMode::ProdMetadataOnly,
            message: String::new(),
            fields: Map::new(),
        }
    }

    fn put(&mut self, field: &Field, value: Value) {
        let name = field.name();
        if name == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            return;
        }
        let value = if self.redact && REDACTED_FIELDS.contains(&name) {
            Value::String(REDACTED.to_string())
        } else {
            value
        };
        self.fields.insert(name.to_string(), value);
    }

    fn into_entry(mut self, service: &str, pid: u32, target: &str, level: &'static str) -> LogEntry {
        let principal_id = match self.fields.remove("principal_id") {
            Some(Value::String(id)) => Some(id),
            Some(other) => Some(other.to_string()),
            None => None,
        };
        let subscription = self.fields.remove("subscription").and_then(|v| v.as_u64());

        LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level,
            service: service.to_string(),
            pid,
            target: target.to_string(),
            message: self.message,
            principal_id,
            subscription,
            span: None,
            fields: self.fields,
        }
    }
}

impl Visit for EntryVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.put(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

/// Writes every event as a JSON line through `W`.
pub struct JsonLayer<W> {
    service: String,
    pid: u32,
    mode: ObservabilityMode,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service: impl Into<String>, mode: ObservabilityMode, make_writer: W) -> Self {
        Self {
            service: service.into(),
            pid: std::process::id(),
            mode,
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = EntryVisitor::new(self.mode);
        event.record(&mut visitor);

        let mut entry =
            visitor.into_entry(&self.service, self.pid, metadata.target(), metadata.level().as_str());
        entry.span = ctx.event_span(event).map(|span| span.name().to_string());

        // A log line that cannot be written is dropped.
        if let Ok(line) = serde_json::to_string(&entry) {
            let mut writer = self.make_writer.make_writer();
            let _ = writeln!(writer, "{line}");
        }
    }
}
