use crate::classify::KindedError;
use crate::level::Level;
use crate::logger::Logger;
use crate::record::ERROR_KEY;
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from this crate are never forwarded, so the shippers' own
/// diagnostics cannot feed back into the sinks they describe.
const OWN_TARGET: &str = "log_shipper";

/// `tracing_subscriber` layer that turns `tracing` events into records of
/// a [`Logger`].
///
/// Event fields become record fields and the event message becomes the
/// record message. An `ERROR` event carrying an `error` field is logged
/// through [`Logger::error_fmt`] as a general error, so it reaches the
/// error hooks; other events are logged without hook dispatch.
pub struct LoggerLayer {
    logger: Logger,
}

impl LoggerLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for LoggerLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET) {
            return;
        }
        let level = Level::from_tracing(meta.level());
        if !self.logger.enabled(level) {
            return;
        }

        let mut fields = Vec::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let message = message.unwrap_or_default();
        let error = match fields.iter().position(|(name, _)| name == ERROR_KEY) {
            Some(idx) if level == Level::Error => Some(fields.remove(idx).1),
            _ => None,
        };
        let logger = self.logger.with_fields(fields);

        match error {
            Some(error) => {
                let text = match error {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                logger.error_fmt(&KindedError::general(text), format_args!("{}", message));
            }
            None => logger.log(level, &message),
        }
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Vec<(String, Value)>,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: Value) {
        let name = field.name();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::sink::LogSink;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    #[derive(Default)]
    struct CaptureSink(Mutex<Vec<Arc<Record>>>);

    impl LogSink for CaptureSink {
        fn print(&self, _formatted: &str, record: &Arc<Record>) {
            self.0.lock().unwrap().push(record.clone());
        }
    }

    fn with_layer(level: Level, f: impl FnOnce()) -> (Vec<Arc<Record>>, Arc<Mutex<usize>>) {
        let sink = Arc::new(CaptureSink::default());
        let hooks = Arc::new(Mutex::new(0));
        let counter = hooks.clone();
        let logger = Logger::builder()
            .level(level)
            .sink(sink.clone())
            .error_hook(move |_, _, _| *counter.lock().unwrap() += 1)
            .build();
        let subscriber = Registry::default().with(LoggerLayer::new(logger));
        tracing::subscriber::with_default(subscriber, f);
        let records = sink.0.lock().unwrap().clone();
        (records, hooks)
    }

    #[test]
    fn events_become_records_with_fields() {
        let (records, _) = with_layer(Level::Debug, || {
            tracing::info!(target: "app", user_id = 42, path = "/orders", "order placed");
        });
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, Level::Info);
        assert_eq!(record.message, "order placed");
        assert_eq!(record.fields.get("user_id"), Some(&Value::from(42)));
        assert_eq!(record.fields.get_str("path"), Some("/orders"));
    }

    #[test]
    fn level_threshold_applies_to_events() {
        let (records, _) = with_layer(Level::Warning, || {
            tracing::debug!(target: "app", "noise");
            tracing::info!(target: "app", "noise");
            tracing::warn!(target: "app", "kept");
        });
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::Warning);
    }

    #[test]
    fn error_field_reaches_hooks() {
        let (records, hooks) = with_layer(Level::Debug, || {
            tracing::error!(target: "app", error = "db timeout", "query failed");
            tracing::error!(target: "app", "plain error");
        });
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields.get_str(ERROR_KEY), Some("db timeout"));
        assert_eq!(records[0].message, "query failed");
        assert_eq!(*hooks.lock().unwrap(), 1);
    }

    #[test]
    fn own_events_are_skipped() {
        let (records, _) = with_layer(Level::Debug, || {
            tracing::warn!(target: "log_shipper::shipper", "internal");
        });
        assert!(records.is_empty());
    }
}
