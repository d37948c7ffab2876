use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

/// One recorded tracing event.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: HashMap<String, serde_json::Value>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// A field rendered as a string, whatever its recorded type.
    pub fn field_str(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// A tracing layer that records every event into shared storage.
///
/// Clones share the same storage, so one clone can be installed in a
/// subscriber while another is kept to inspect what was logged.
///
/// ```rust,ignore
/// use tracing_subscriber::layer::SubscriberExt;
///
/// let capture = EventCapture::new();
/// let subscriber = tracing_subscriber::registry().with(capture.clone());
/// tracing::subscriber::with_default(subscriber, || tracing::info!(tenant = "acme", "hello"));
/// assert_eq!(capture.with_message("hello").len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventCapture {
    events: Arc<RwLock<Vec<CapturedEvent>>>,
    min_level: Option<Level>,
}

impl EventCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only record events at `level` or more severe.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = Some(level);
        self
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.read().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.message == message).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    fn push(&self, event: CapturedEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}

impl<S> Layer<S> for EventCapture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // Level ordering: TRACE > DEBUG > ... > ERROR
        if self.min_level.is_some_and(|min| *metadata.level() > min) {
            return;
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = match fields.remove("message") {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        self.push(CapturedEvent {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
        });
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn records_message_and_typed_fields() {
        let capture = EventCapture::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(tenant = "acme", chunk_count = 3u64, fallback_used = false, "ingested document");
        });

        let events = capture.with_message("ingested document");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, "INFO");
        assert_eq!(events[0].field_str("tenant").as_deref(), Some("acme"));
        assert_eq!(events[0].field("chunk_count"), Some(&serde_json::json!(3)));
        assert_eq!(events[0].field("fallback_used"), Some(&serde_json::json!(false)));
    }

    #[test]
    fn min_level_filters_verbose_events() {
        let capture = EventCapture::new().with_min_level(Level::WARN);
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("noise");
            tracing::warn!("retrying");
            tracing::error!("gave up");
        });

        let messages: Vec<_> = capture.events().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["retrying", "gave up"]);

        capture.clear();
        assert!(capture.events().is_empty());
    }
}
