//! JSONL formatting layer.
//!
//! Each tracing event becomes one line carrying timestamp, level, service,
//! pid, target, message and the structured fields.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// One line of the JSONL log.
#[derive(Debug, Serialize)]
pub struct LogEntry<'a> {
    pub timestamp: String,
    pub level: &'static str,
    pub service: &'a str,
    pub pid: u32,
    pub target: &'a str,
    pub message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    /// Innermost span, if the event happened inside one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<&'static str>,
}

/// Collects an event's `message` and its other fields as JSON values.
#[derive(Default)]
struct JsonRecorder {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl JsonRecorder {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() != "message" {
            self.fields.insert(field.name().to_string(), value);
            return;
        }
        self.message = Some(match value {
            Value::String(text) => text,
            other => other.to_string(),
        });
    }
}

impl Visit for JsonRecorder {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::String(format!("{:?}", value)));
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
        // NaN and infinities have no JSON number form
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.put(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

/// Layer writing one [`LogEntry`] per event to `W`.
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
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut recorder = JsonRecorder::default();
        event.record(&mut recorder);

        let metadata = event.metadata();
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: metadata.level().as_str(),
            service: &self.service_name,
            pid: self.pid,
            target: metadata.target(),
            message: recorder.message.unwrap_or_default(),
            fields: recorder.fields,
            span: ctx.event_span(event).map(|span| span.name()),
        };

        let Ok(line) = serde_json::to_string(&entry) else {
            return;
        };
        let mut writer = self.make_writer.make_writer();
        let _ = writeln!(writer, "{}", line);
    }
}
